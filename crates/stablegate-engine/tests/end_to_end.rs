//! End-to-end tests of the quote → reserve → cash-out lifecycle.
//!
//! These drive a real [`Engine`] under a [`ManualClock`] through the
//! scenarios operators care about: the happy path, lazy expiry, staleness
//! gating, slippage and cap limits, cancellation and sweeping.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use stablegate_engine::{Engine, ManualClock, Operation, Outcome, PrometheusMetrics, SweepReport};
use stablegate_types::{AssetConfig, LedgerBalance, Limits, QuoteId, StableGateError};

const UNIT: i64 = 1_000_000;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 10, 9, 30, 0).unwrap()
}

fn znhb() -> AssetConfig {
    AssetConfig::new("ZNHB", "ZNHB", "USD", Decimal::new(1_000, 0))
        .with_quote_ttl(Duration::from_secs(10))
        .with_max_slippage_bps(50)
}

/// Engine with ZNHB at 1.00 and the given limits.
fn setup(limits: Limits) -> (Engine, ManualClock) {
    init_tracing();
    let clock = ManualClock::new(t0());
    let engine = Engine::builder(vec![znhb()], limits)
        .clock(clock.clone())
        .build()
        .unwrap();
    engine
        .record_price("ZNHB", "ZNHB", "USD", Decimal::ONE, None)
        .unwrap();
    (engine, clock)
}

fn balance(available: i64, reserved: i64, payouts: i64) -> LedgerBalance {
    LedgerBalance {
        available: available * UNIT,
        reserved: reserved * UNIT,
        payouts: payouts * UNIT,
    }
}

fn hundred() -> Decimal {
    Decimal::new(100, 0)
}

#[test]
fn quote_reserve_cash_out() {
    let (engine, _clock) = setup(Limits::default());

    let quote = engine.price("ZNHB", hundred()).unwrap();
    assert_eq!(quote.amount, 100 * UNIT);
    assert_eq!(quote.price, 1_000_000_000);
    assert_eq!(quote.expires_at, t0() + chrono::Duration::seconds(10));

    let res = engine.reserve(&quote.id, "acct", hundred()).unwrap();
    assert_eq!(res.amount_out, 100 * UNIT);
    assert_eq!(res.account, "acct");
    assert_eq!(engine.ledger_balance("ZNHB"), Some(balance(900, 100, 0)));

    let intent = engine.create_cash_out_intent(&quote.id).unwrap();
    assert_eq!(intent.amount(), hundred());
    assert_eq!(intent.reservation_id, quote.id);
    assert_eq!(intent.created_at, t0());
    assert_eq!(engine.ledger_balance("ZNHB"), Some(balance(900, 0, 100)));

    let err = engine.create_cash_out_intent(&quote.id).unwrap_err();
    assert!(matches!(err, StableGateError::ReservationConsumed(_)));
    assert_eq!(err.http_status(), 409);
    assert_eq!(engine.ledger_balance("ZNHB"), Some(balance(900, 0, 100)));
    engine.verify_conservation().unwrap();
}

#[test]
fn reserved_output_uses_quoted_rate() {
    let (engine, _clock) = setup(Limits::default());
    engine
        .record_price("ZNHB", "ZNHB", "USD", Decimal::new(125, 2), None)
        .unwrap();
    let quote = engine.price("ZNHB", hundred()).unwrap();
    let res = engine.reserve(&quote.id, "acct", hundred()).unwrap();
    assert_eq!(res.amount_out, 125 * UNIT);
    assert_eq!(res.price, 1_250_000_000);
    assert_eq!(engine.ledger_balance("ZNHB"), Some(balance(875, 125, 0)));
}

#[test]
fn expired_reservation_releases_inventory() {
    let (engine, clock) = setup(Limits::default());
    let quote = engine.price("ZNHB", hundred()).unwrap();
    engine.reserve(&quote.id, "acct", hundred()).unwrap();

    clock.advance(chrono::Duration::seconds(11));
    let err = engine.create_cash_out_intent(&quote.id).unwrap_err();
    assert!(matches!(err, StableGateError::ReservationExpired(_)));
    assert_eq!(engine.ledger_balance("ZNHB"), Some(balance(1_000, 0, 0)));
    assert_eq!(engine.status().reservations, 0);

    let err = engine.create_cash_out_intent(&quote.id).unwrap_err();
    assert!(matches!(err, StableGateError::ReservationNotFound(_)));
}

#[test]
fn reservation_valid_at_exact_expiry() {
    let (engine, clock) = setup(Limits::default());
    let quote = engine.price("ZNHB", hundred()).unwrap();
    engine.reserve(&quote.id, "acct", hundred()).unwrap();
    clock.advance(chrono::Duration::seconds(10));
    assert!(engine.create_cash_out_intent(&quote.id).is_ok());
}

#[test]
fn expired_quote_is_deleted() {
    let (engine, clock) = setup(Limits::default());
    let quote = engine.price("ZNHB", hundred()).unwrap();
    clock.advance(chrono::Duration::seconds(11));
    engine
        .record_price("ZNHB", "ZNHB", "USD", Decimal::ONE, None)
        .unwrap();

    let err = engine.reserve(&quote.id, "acct", hundred()).unwrap_err();
    assert!(matches!(err, StableGateError::QuoteExpired(_)));
    let err = engine.reserve(&quote.id, "acct", hundred()).unwrap_err();
    assert!(matches!(err, StableGateError::QuoteNotFound(_)));
    assert_eq!(engine.ledger_balance("ZNHB"), Some(balance(1_000, 0, 0)));
}

#[test]
fn quote_is_single_use() {
    let (engine, _clock) = setup(Limits::default());
    let quote = engine.price("ZNHB", hundred()).unwrap();
    engine.reserve(&quote.id, "acct", hundred()).unwrap();
    let err = engine.reserve(&quote.id, "acct", hundred()).unwrap_err();
    assert!(matches!(err, StableGateError::QuoteNotFound(_)));
    assert_eq!(engine.ledger_balance("ZNHB"), Some(balance(900, 100, 0)));
}

#[test]
fn unknown_quote_not_found() {
    let (engine, _clock) = setup(Limits::default());
    let err = engine
        .reserve(&QuoteId::from("q-missing"), "acct", hundred())
        .unwrap_err();
    assert!(matches!(err, StableGateError::QuoteNotFound(_)));
    assert_eq!(err.http_status(), 404);
}

#[test]
fn staleness_gates_pricing_and_reservation() {
    let (engine, clock) = setup(Limits::default());
    assert!(engine.price("ZNHB", hundred()).is_ok());

    clock.advance(chrono::Duration::seconds(299));
    let quote = engine.price("ZNHB", hundred()).unwrap();

    clock.advance(chrono::Duration::seconds(2));
    let err = engine.price("ZNHB", hundred()).unwrap_err();
    assert!(matches!(err, StableGateError::PriceUnavailable { .. }));
    assert_eq!(err.http_status(), 503);
    let err = engine.reserve(&quote.id, "acct", hundred()).unwrap_err();
    assert!(matches!(err, StableGateError::PriceUnavailable { .. }));
    assert_eq!(engine.ledger_balance("ZNHB"), Some(balance(1_000, 0, 0)));

    engine
        .record_price("ZNHB", "ZNHB", "USD", Decimal::ONE, None)
        .unwrap();
    assert!(engine.reserve(&quote.id, "acct", hundred()).is_ok());
}

#[test]
fn price_max_age_is_adjustable() {
    let (engine, clock) = setup(Limits::default());
    engine.set_price_max_age(Duration::from_secs(5));
    assert_eq!(engine.price_max_age(), Duration::from_secs(5));
    clock.advance(chrono::Duration::seconds(6));
    assert!(engine.price("ZNHB", hundred()).is_err());
    engine.set_price_max_age(Duration::ZERO);
    assert!(engine.price("ZNHB", hundred()).is_ok());
}

#[test]
fn missing_price_unavailable() {
    init_tracing();
    let engine = Engine::builder(vec![znhb()], Limits::default())
        .clock(ManualClock::new(t0()))
        .build()
        .unwrap();
    let err = engine.price("ZNHB", hundred()).unwrap_err();
    assert!(matches!(err, StableGateError::PriceUnavailable { ref pair } if pair == "ZNHB/USD"));
}

#[test]
fn slippage_boundary() {
    let (engine, _clock) = setup(Limits::default());

    // Exactly 50 bps above the locked rate is accepted.
    let q1 = engine.price("ZNHB", hundred()).unwrap();
    engine
        .record_price("ZNHB", "ZNHB", "USD", Decimal::new(1_005, 3), None)
        .unwrap();
    assert!(engine.reserve(&q1.id, "acct", hundred()).is_ok());

    // One basis point more is rejected without touching the ledger.
    engine
        .record_price("ZNHB", "ZNHB", "USD", Decimal::ONE, None)
        .unwrap();
    let q2 = engine.price("ZNHB", hundred()).unwrap();
    engine
        .record_price("ZNHB", "ZNHB", "USD", Decimal::new(10_051, 4), None)
        .unwrap();
    let before = engine.ledger_balance("ZNHB");
    let usage = engine.daily_usage();
    let err = engine.reserve(&q2.id, "acct", hundred()).unwrap_err();
    assert!(matches!(
        err,
        StableGateError::SlippageExceeded {
            quoted: 1_000_000_000,
            observed: 1_005_100_000,
            max_bps: 50
        }
    ));
    assert_eq!(engine.ledger_balance("ZNHB"), before);
    assert_eq!(engine.daily_usage(), usage);
}

#[test]
fn zero_slippage_bps_disables_check() {
    init_tracing();
    let clock = ManualClock::new(t0());
    let engine = Engine::builder(vec![znhb().with_max_slippage_bps(0)], Limits::default())
        .clock(clock)
        .build()
        .unwrap();
    engine
        .record_price("ZNHB", "ZNHB", "USD", Decimal::ONE, None)
        .unwrap();
    let quote = engine.price("ZNHB", hundred()).unwrap();
    engine
        .record_price("ZNHB", "ZNHB", "USD", Decimal::new(10_001, 4), None)
        .unwrap();

    let res = engine.reserve(&quote.id, "acct", hundred()).unwrap();
    assert_eq!(res.price, 1_000_000_000);
    assert_eq!(res.amount_out, 100 * UNIT);
}

#[test]
fn later_price_always_replaces_held_sample() {
    let (engine, clock) = setup(Limits::default());

    // A stamp ahead of the clock is held at the clock reading.
    let ahead = t0() + chrono::Duration::hours(1);
    engine
        .record_price("ZNHB", "ZNHB", "USD", Decimal::new(2, 0), Some(ahead))
        .unwrap();
    assert_eq!(engine.latest_price("ZNHB").unwrap().observed_at, t0());

    engine
        .record_price("ZNHB", "ZNHB", "USD", Decimal::ONE, None)
        .unwrap();
    assert_eq!(engine.price("ZNHB", hundred()).unwrap().price, 1_000_000_000);

    // An explicitly older stamp still replaces the held sample.
    clock.advance(chrono::Duration::seconds(30));
    let earlier = t0() + chrono::Duration::seconds(10);
    engine
        .record_price("ZNHB", "ZNHB", "USD", Decimal::new(11, 1), Some(earlier))
        .unwrap();
    let sample = engine.latest_price("ZNHB").unwrap();
    assert_eq!(sample.rate, 1_100_000_000);
    assert_eq!(sample.observed_at, earlier);
    assert_eq!(engine.price("ZNHB", hundred()).unwrap().price, 1_100_000_000);
}

#[test]
fn amount_mismatch_rejected() {
    let (engine, _clock) = setup(Limits::default());
    let quote = engine.price("ZNHB", hundred()).unwrap();
    let err = engine
        .reserve(&quote.id, "acct", Decimal::new(100_000_001, 6))
        .unwrap_err();
    assert!(matches!(
        err,
        StableGateError::QuoteAmountMismatch { quoted: 100_000_000, requested: 100_000_001 }
    ));
    assert_eq!(err.http_status(), 422);

    let err = engine
        .reserve(&quote.id, "acct", Decimal::new(1_000_000_001, 7))
        .unwrap_err();
    assert!(matches!(err, StableGateError::PrecisionLoss { .. }));

    // The quote survives a rejected reservation.
    assert!(engine.reserve(&quote.id, "acct", hundred()).is_ok());
}

#[test]
fn daily_cap_enforced_and_credited_on_cancel() {
    let (engine, _clock) = setup(Limits::with_daily_cap(Decimal::new(150, 0)));

    let q1 = engine.price("ZNHB", hundred()).unwrap();
    engine.reserve(&q1.id, "acct", hundred()).unwrap();
    assert_eq!(engine.daily_usage_today(), 100 * UNIT);

    let q2 = engine.price("ZNHB", Decimal::new(60, 0)).unwrap();
    let before = engine.ledger_balance("ZNHB");
    let err = engine.reserve(&q2.id, "acct", Decimal::new(60, 0)).unwrap_err();
    assert!(matches!(err, StableGateError::DailyCapExceeded { .. }));
    assert_eq!(err.http_status(), 429);
    assert_eq!(engine.ledger_balance("ZNHB"), before);
    assert_eq!(engine.daily_usage_today(), 100 * UNIT);

    let released = engine.cancel_reservation(&q1.id).unwrap();
    assert_eq!(released.amount_out, 100 * UNIT);
    assert_eq!(engine.daily_usage_today(), 0);

    engine.reserve(&q2.id, "acct", Decimal::new(60, 0)).unwrap();
    assert_eq!(engine.daily_usage_today(), 60 * UNIT);
}

#[test]
fn daily_cap_exact_boundary_and_rollover() {
    let (engine, clock) = setup(Limits::with_daily_cap(Decimal::new(100, 0)));
    let q1 = engine.price("ZNHB", hundred()).unwrap();
    engine.reserve(&q1.id, "acct", hundred()).unwrap();

    let q2 = engine.price("ZNHB", Decimal::ONE).unwrap();
    assert!(matches!(
        engine.reserve(&q2.id, "acct", Decimal::ONE).unwrap_err(),
        StableGateError::DailyCapExceeded { .. }
    ));

    clock.set(Utc.with_ymd_and_hms(2024, 7, 11, 0, 0, 0).unwrap());
    engine
        .record_price("ZNHB", "ZNHB", "USD", Decimal::ONE, None)
        .unwrap();
    let q3 = engine.price("ZNHB", Decimal::ONE).unwrap();
    assert!(engine.reserve(&q3.id, "acct", Decimal::ONE).is_ok());
    assert_eq!(engine.daily_usage_today(), UNIT);
}

#[test]
fn zero_cap_disables_limit() {
    let (engine, _clock) = setup(Limits::with_daily_cap(Decimal::ZERO));
    let quote = engine.price("ZNHB", Decimal::new(1_000, 0)).unwrap();
    assert!(engine.reserve(&quote.id, "acct", Decimal::new(1_000, 0)).is_ok());
}

#[test]
fn insufficient_inventory_rejected() {
    let (engine, _clock) = setup(Limits::default());
    let quote = engine.price("ZNHB", Decimal::new(1_001, 0)).unwrap();
    let err = engine
        .reserve(&quote.id, "acct", Decimal::new(1_001, 0))
        .unwrap_err();
    assert!(matches!(
        err,
        StableGateError::InsufficientReserve { needed: 1_001_000_000, available: 1_000_000_000 }
    ));
    assert_eq!(engine.ledger_balance("ZNHB"), Some(balance(1_000, 0, 0)));
    assert!(engine.daily_usage().is_none());
}

#[test]
fn unsupported_asset_and_bad_amounts() {
    let (engine, _clock) = setup(Limits::default());
    let err = engine.price("BTC", hundred()).unwrap_err();
    assert!(matches!(err, StableGateError::NotSupported(ref s) if s == "BTC"));
    assert_eq!(err.http_status(), 404);

    assert!(matches!(
        engine.price("ZNHB", Decimal::ZERO).unwrap_err(),
        StableGateError::InvalidAmount { .. }
    ));
    assert!(matches!(
        engine.price("ZNHB", Decimal::new(1, 7)).unwrap_err(),
        StableGateError::PrecisionLoss { .. }
    ));
    assert_eq!(engine.status().quotes, 0);
}

#[test]
fn cancel_paths() {
    let (engine, _clock) = setup(Limits::default());
    let q1 = engine.price("ZNHB", hundred()).unwrap();
    engine.reserve(&q1.id, "acct", hundred()).unwrap();
    let released = engine.cancel_reservation(&q1.id).unwrap();
    assert_eq!(released.quote_id, q1.id);
    assert_eq!(engine.ledger_balance("ZNHB"), Some(balance(1_000, 0, 0)));
    assert!(matches!(
        engine.cancel_reservation(&q1.id).unwrap_err(),
        StableGateError::ReservationNotFound(_)
    ));

    let q2 = engine.price("ZNHB", hundred()).unwrap();
    engine.reserve(&q2.id, "acct", hundred()).unwrap();
    engine.create_cash_out_intent(&q2.id).unwrap();
    assert!(matches!(
        engine.cancel_reservation(&q2.id).unwrap_err(),
        StableGateError::ReservationConsumed(_)
    ));
    engine.verify_conservation().unwrap();
}

#[test]
fn sweep_releases_expired_entries() {
    let (engine, clock) = setup(Limits::with_daily_cap(Decimal::new(500, 0)));
    let q1 = engine.price("ZNHB", hundred()).unwrap();
    let q2 = engine.price("ZNHB", hundred()).unwrap();
    let _q3 = engine.price("ZNHB", hundred()).unwrap();
    engine.reserve(&q1.id, "acct", hundred()).unwrap();
    engine.reserve(&q2.id, "acct", hundred()).unwrap();
    assert_eq!(engine.status().quotes, 1);
    assert_eq!(engine.status().reservations, 2);

    assert_eq!(engine.sweep_expired(), SweepReport::default());

    clock.advance(chrono::Duration::seconds(11));
    let report = engine.sweep_expired();
    assert_eq!(report.expired_quotes, 1);
    assert_eq!(report.released_reservations, 2);

    let status = engine.status();
    assert_eq!((status.quotes, status.reservations, status.assets), (0, 0, 1));
    assert_eq!(engine.ledger_balance("ZNHB"), Some(balance(1_000, 0, 0)));
    assert_eq!(engine.daily_usage_today(), 0);
}

#[test]
fn metrics_observe_each_operation() {
    init_tracing();
    let metrics = Arc::new(PrometheusMetrics::new().unwrap());
    let clock = ManualClock::new(t0());
    let engine = Engine::builder(vec![znhb()], Limits::default())
        .clock(clock)
        .metrics(metrics.clone())
        .build()
        .unwrap();
    engine
        .record_price("ZNHB", "ZNHB", "USD", Decimal::ONE, None)
        .unwrap();

    let quote = engine.price("ZNHB", hundred()).unwrap();
    engine.reserve(&quote.id, "acct", hundred()).unwrap();
    let _ = engine.reserve(&quote.id, "acct", hundred());
    engine.create_cash_out_intent(&quote.id).unwrap();
    engine.sweep_expired();

    assert_eq!(metrics.count(Operation::Quote, Outcome::Ok), 1);
    assert_eq!(metrics.count(Operation::Reserve, Outcome::Ok), 1);
    assert_eq!(metrics.count(Operation::Reserve, Outcome::Err("SG_ERR_300")), 1);
    assert_eq!(metrics.count(Operation::CashOut, Outcome::Ok), 1);
    assert_eq!(metrics.count(Operation::Sweep, Outcome::Ok), 1);
    assert!(metrics.gather_text().unwrap().contains(r#"op="cash_out""#));
}

#[test]
fn concurrent_reservations_never_oversell() {
    let (engine, _clock) = setup(Limits::default());
    let engine = Arc::new(engine);
    let quotes: Vec<QuoteId> = (0..20)
        .map(|_| engine.price("ZNHB", hundred()).unwrap().id)
        .collect();

    let handles: Vec<_> = quotes
        .into_iter()
        .map(|id| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || engine.reserve(&id, "acct", Decimal::new(100, 0)).is_ok())
        })
        .collect();
    let accepted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(accepted, 10);
    assert_eq!(engine.ledger_balance("ZNHB"), Some(balance(0, 1_000, 0)));
    engine.verify_conservation().unwrap();
}
