//! The StableGate engine: quote, reserve, cash out.
//!
//! ```text
//!  price()          reserve()              create_cash_out_intent()
//! ────────► QUOTED ──────────► RESERVED ─────────────────────────► CASHED_OUT
//!              │                  │
//!              │ ttl              │ ttl / cancel_reservation()
//!              ▼                  ▼
//!           EXPIRED        EXPIRED / CANCELLED  (inventory released)
//! ```
//!
//! All mutable state lives behind one `RwLock`. Every mutating call takes
//! the write lock, re-validates, persists the projected state, and only
//! then commits in memory. A failed store write leaves memory untouched.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use stablegate_ledger::{
    DailyCapTracker, DailyUsageStore, InventoryConservation, InventoryLedger, JsonFileStore,
    LedgerStore, ReservationStore,
};
use stablegate_pricing::{
    PriceCache, PriceSample, exceeds_slippage, mul_div_round, to_amount_units,
    to_rate_units,
};
use stablegate_types::constants::{DEFAULT_TOMBSTONE_CAPACITY, RATE_SCALE};
use stablegate_types::{
    AssetConfig, CashOutIntent, DailyUsage, EngineConfig, EngineStatus, IntentId, LedgerBalance,
    LedgerBalanceRecord, Limits, Quote, QuoteId, Reservation, ReservationRecord, Result,
    StableGateError, normalize_symbol, pair_key,
};

use crate::clock::{Clock, SystemClock};
use crate::metrics::{EngineMetrics, NoopMetrics, Operation, Outcome};

/// Counts from one [`Engine::sweep_expired`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_quotes: usize,
    pub released_reservations: usize,
}

/// Immutable per-asset settings resolved at build time.
#[derive(Debug, Clone)]
struct AssetRuntime {
    config: AssetConfig,
    quote_ttl: chrono::Duration,
}

/// Everything guarded by the engine lock.
struct EngineState {
    prices: PriceCache,
    ledger: InventoryLedger,
    daily: DailyCapTracker,
    table: ReservationStore,
    price_max_age: Duration,
    last_quote_at: Option<DateTime<Utc>>,
    quote_seq: u64,
}

impl EngineState {
    /// Allocate a quote ID unique among live quotes, reservations and
    /// tombstones, even under a frozen clock.
    fn next_quote_id(&mut self, now: DateTime<Utc>) -> QuoteId {
        if self.last_quote_at == Some(now) {
            self.quote_seq += 1;
        } else {
            self.last_quote_at = Some(now);
            self.quote_seq = 0;
        }
        loop {
            let id = QuoteId::from_clock(now, self.quote_seq);
            let taken = self.table.contains_quote(&id)
                || self.table.reservation(&id).is_some()
                || self.table.is_consumed(&id);
            if !taken {
                return id;
            }
            self.quote_seq += 1;
        }
    }
}

/// Stable-asset quote and reservation engine.
///
/// `Engine` is `Send + Sync`; share it behind an `Arc`.
pub struct Engine {
    assets: HashMap<String, AssetRuntime>,
    asset_order: Vec<String>,
    limits: Limits,
    daily_cap: Option<i64>,
    cap_offset: FixedOffset,
    clock: Arc<dyn Clock>,
    daily_store: Option<Arc<dyn DailyUsageStore>>,
    ledger_store: Option<Arc<dyn LedgerStore>>,
    metrics: Arc<dyn EngineMetrics>,
    state: RwLock<EngineState>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("assets", &self.asset_order)
            .field("limits", &self.limits)
            .field("clock", &self.clock.name())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Configures and restores an [`Engine`].
pub struct EngineBuilder {
    assets: Vec<AssetConfig>,
    limits: Limits,
    clock: Arc<dyn Clock>,
    price_max_age: Duration,
    daily_store: Option<Arc<dyn DailyUsageStore>>,
    ledger_store: Option<Arc<dyn LedgerStore>>,
    metrics: Arc<dyn EngineMetrics>,
    tombstone_capacity: usize,
    cap_offset: FixedOffset,
}

impl EngineBuilder {
    fn new(assets: Vec<AssetConfig>, limits: Limits) -> Self {
        Self {
            assets,
            limits,
            clock: Arc::new(SystemClock::new()),
            price_max_age: Duration::from_millis(
                stablegate_types::constants::DEFAULT_PRICE_MAX_AGE_MS,
            ),
            daily_store: None,
            ledger_store: None,
            metrics: Arc::new(NoopMetrics),
            tombstone_capacity: DEFAULT_TOMBSTONE_CAPACITY,
            cap_offset: Utc.fix(),
        }
    }

    #[must_use]
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Maximum oracle sample age. Zero disables the staleness check.
    #[must_use]
    pub fn price_max_age(mut self, max_age: Duration) -> Self {
        self.price_max_age = max_age;
        self
    }

    #[must_use]
    pub fn daily_store(mut self, store: Arc<dyn DailyUsageStore>) -> Self {
        self.daily_store = Some(store);
        self
    }

    #[must_use]
    pub fn ledger_store(mut self, store: Arc<dyn LedgerStore>) -> Self {
        self.ledger_store = Some(store);
        self
    }

    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn EngineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    #[must_use]
    pub fn tombstone_capacity(mut self, capacity: usize) -> Self {
        self.tombstone_capacity = capacity;
        self
    }

    /// Offset of the day boundary used for the daily cap. Defaults to UTC.
    #[must_use]
    pub fn cap_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.cap_offset = offset;
        self
    }

    /// Validate the asset set, restore persisted state and build the engine.
    ///
    /// # Errors
    /// - `Configuration` for an empty or invalid asset set or cap
    /// - any error returned while loading from a configured store
    /// - `ConservationViolation` if a persisted balance does not fit the
    ///   configured inventory
    pub fn build(self) -> Result<Engine> {
        if self.assets.is_empty() {
            return Err(StableGateError::Configuration(
                "at least one asset must be configured".into(),
            ));
        }

        let mut assets = HashMap::with_capacity(self.assets.len());
        let mut asset_order = Vec::with_capacity(self.assets.len());
        let mut ledger = InventoryLedger::new();
        for mut config in self.assets {
            let key = config.key();
            if key.is_empty() {
                return Err(StableGateError::Configuration("asset missing symbol".into()));
            }
            if assets.contains_key(&key) {
                return Err(StableGateError::Configuration(format!(
                    "duplicate asset symbol {key}"
                )));
            }
            if config.base_pair.trim().is_empty() || config.quote_pair.trim().is_empty() {
                return Err(StableGateError::Configuration(format!(
                    "asset {key} missing oracle pair"
                )));
            }
            let quote_ttl = chrono::Duration::from_std(config.quote_ttl)
                .ok()
                .filter(|ttl| *ttl > chrono::Duration::zero())
                .ok_or_else(|| {
                    StableGateError::Configuration(format!("asset {key} quote TTL out of range"))
                })?;
            let inventory = to_amount_units(config.soft_inventory).map_err(|e| {
                StableGateError::Configuration(format!("asset {key} soft inventory: {e}"))
            })?;
            ledger.register(&key, inventory);
            config.symbol.clone_from(&key);
            asset_order.push(key.clone());
            assets.insert(key, AssetRuntime { config, quote_ttl });
        }

        let daily_cap = self
            .limits
            .effective_daily_cap()
            .map(to_amount_units)
            .transpose()
            .map_err(|e| StableGateError::Configuration(format!("daily cap: {e}")))?;

        let mut daily = DailyCapTracker::new();
        if let Some(store) = &self.daily_store {
            if let Some(usage) = store.latest_daily_usage()? {
                daily.restore(usage);
                tracing::info!(day = %usage.day, amount = usage.amount, "restored daily usage");
            }
        }

        let mut table = ReservationStore::new(self.tombstone_capacity);
        if let Some(store) = &self.ledger_store {
            restore_ledger(store.as_ref(), &mut ledger, &mut table)?;
        }

        tracing::info!(
            assets = asset_order.len(),
            clock = self.clock.name(),
            daily_cap = ?daily_cap,
            "stablegate engine ready"
        );

        Ok(Engine {
            assets,
            asset_order,
            limits: self.limits,
            daily_cap,
            cap_offset: self.cap_offset,
            clock: self.clock,
            daily_store: self.daily_store,
            ledger_store: self.ledger_store,
            metrics: self.metrics,
            state: RwLock::new(EngineState {
                prices: PriceCache::new(),
                ledger,
                daily,
                table,
                price_max_age: self.price_max_age,
                last_quote_at: None,
                quote_seq: 0,
            }),
        })
    }
}

fn restore_ledger(
    store: &dyn LedgerStore,
    ledger: &mut InventoryLedger,
    table: &mut ReservationStore,
) -> Result<()> {
    for record in store.load_ledger_balances()? {
        let key = normalize_symbol(&record.asset);
        if !ledger.contains(&key) {
            tracing::warn!(asset = %record.asset, "skipping persisted balance for unknown asset");
            continue;
        }
        ledger.restore(&key, record.balance())?;
    }

    let mut restored = 0usize;
    for record in store.load_reservations()? {
        let key = normalize_symbol(&record.asset);
        if !ledger.contains(&key) {
            tracing::warn!(quote_id = %record.id, asset = %record.asset,
                "skipping persisted reservation for unknown asset");
            continue;
        }
        let mut reservation = Reservation::from(record);
        reservation.asset = key;
        table.insert_reservation(reservation);
        restored += 1;
    }

    for (asset, _, balance) in ledger.entries() {
        let outstanding = table.outstanding_for(&asset);
        if outstanding != i128::from(balance.reserved) {
            tracing::warn!(
                asset = %asset,
                reserved = balance.reserved,
                outstanding = %outstanding,
                "persisted reservations do not match reserved balance"
            );
        }
    }
    if restored > 0 {
        tracing::info!(reservations = restored, "restored outstanding reservations");
    }
    Ok(())
}

fn persistence(err: StableGateError) -> StableGateError {
    match err {
        StableGateError::Persistence(_) => err,
        other => StableGateError::Persistence(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

impl Engine {
    /// Start configuring an engine for `assets` under `limits`.
    #[must_use]
    pub fn builder(assets: Vec<AssetConfig>, limits: Limits) -> EngineBuilder {
        EngineBuilder::new(assets, limits)
    }

    /// Builder pre-populated from a loaded configuration. When `store_path`
    /// is set, one [`JsonFileStore`] at that path backs both stores. Clock
    /// and metrics are still supplied by the caller.
    ///
    /// # Errors
    /// - `Configuration` if the configuration is invalid
    /// - `Io` / `Serialization` if the store file cannot be opened
    pub fn from_config(config: &EngineConfig) -> Result<EngineBuilder> {
        config.validate()?;
        let offset = FixedOffset::east_opt(config.cap_utc_offset_secs).ok_or_else(|| {
            StableGateError::Configuration(format!(
                "invalid cap UTC offset {}s",
                config.cap_utc_offset_secs
            ))
        })?;
        let mut builder = Self::builder(config.assets.clone(), config.limits.clone())
            .price_max_age(config.price_max_age())
            .tombstone_capacity(config.tombstone_capacity)
            .cap_utc_offset(offset);
        if let Some(path) = &config.store_path {
            let store = Arc::new(JsonFileStore::open(path)?);
            tracing::info!(path = %path.display(), "using json file store");
            builder = builder.daily_store(store.clone()).ledger_store(store);
        }
        Ok(builder)
    }

    // -- oracle --------------------------------------------------------------

    /// Feed an oracle rate for `asset`'s `base/quote` pair. Each call
    /// replaces the held sample.
    ///
    /// A missing `observed_at` defaults to the engine clock, and a stamp
    /// ahead of the clock is clamped to it.
    ///
    /// # Errors
    /// - `NotSupported` if `asset` is not configured or `base/quote` is not
    ///   its oracle pair
    /// - `InvalidAmount` / `PrecisionLoss` / `Overflow` if the rate cannot be
    ///   quantized
    pub fn record_price(
        &self,
        asset: &str,
        base: &str,
        quote: &str,
        rate: Decimal,
        observed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let cfg = &self.asset(asset)?.config;
        let pair = pair_key(base, quote);
        if pair != cfg.pair_key() {
            return Err(StableGateError::NotSupported(format!(
                "pair {pair} for asset {} (expects {})",
                cfg.symbol,
                cfg.pair_key()
            )));
        }
        let rate_units = to_rate_units(rate)?;
        let now = self.clock.now();
        let observed_at = match observed_at {
            Some(at) if at > now => {
                tracing::warn!(%pair, observed_at = %at, %now, "price stamped ahead of clock");
                now
            }
            Some(at) => at,
            None => now,
        };
        self.state
            .write()
            .prices
            .record(base, quote, rate_units, observed_at);
        tracing::trace!(asset = %cfg.symbol, %pair, rate = rate_units, "price recorded");
        Ok(())
    }

    /// Latest sample for `asset`'s configured pair, fresh or not.
    #[must_use]
    pub fn latest_price(&self, asset: &str) -> Option<PriceSample> {
        let runtime = self.asset(asset).ok()?;
        self.state
            .read()
            .prices
            .latest(&runtime.config.base_pair, &runtime.config.quote_pair)
    }

    #[must_use]
    pub fn price_max_age(&self) -> Duration {
        self.state.read().price_max_age
    }

    pub fn set_price_max_age(&self, max_age: Duration) {
        self.state.write().price_max_age = max_age;
    }

    // -- quote ---------------------------------------------------------------

    /// Issue a quote for `amount` of `asset` at the current oracle rate.
    ///
    /// # Errors
    /// - `NotSupported` if the asset is unknown
    /// - `PriceUnavailable` if no fresh price exists
    /// - `InvalidAmount` / `PrecisionLoss` / `Overflow` for a bad amount
    pub fn price(&self, asset: &str, amount: Decimal) -> Result<Quote> {
        self.measured(Operation::Quote, || self.price_inner(asset, amount))
    }

    fn price_inner(&self, asset: &str, amount: Decimal) -> Result<Quote> {
        let runtime = self.asset(asset)?;
        let cfg = &runtime.config;
        let now = self.clock.now();
        let mut state = self.state.write();

        let sample = state
            .prices
            .fresh(&cfg.base_pair, &cfg.quote_pair, now, state.price_max_age)?;
        let amount_units = to_amount_units(amount)?;
        let expires_at = now
            .checked_add_signed(runtime.quote_ttl)
            .ok_or_else(|| StableGateError::Overflow("quote expiry".into()))?;

        let quote = Quote {
            id: state.next_quote_id(now),
            asset: cfg.symbol.clone(),
            price: sample.rate,
            amount: amount_units,
            issued_at: now,
            expires_at,
        };
        state.table.insert_quote(quote.clone());
        tracing::debug!(
            quote_id = %quote.id,
            asset = %quote.asset,
            amount = amount_units,
            price = sample.rate,
            "quote issued"
        );
        Ok(quote)
    }

    // -- reserve -------------------------------------------------------------

    /// Turn a quote into a reservation backed by soft inventory.
    ///
    /// The quote is consumed on success; reserving it again reports
    /// `QuoteNotFound`.
    ///
    /// # Errors
    /// `QuoteNotFound`, `QuoteExpired`, `QuoteAmountMismatch`,
    /// `PriceUnavailable`, `SlippageExceeded`, `DailyCapExceeded`,
    /// `InsufficientReserve`, `Persistence`, or a quantization error.
    pub fn reserve(
        &self,
        quote_id: &QuoteId,
        account: &str,
        amount_in: Decimal,
    ) -> Result<Reservation> {
        self.measured(Operation::Reserve, || {
            self.reserve_inner(quote_id, account, amount_in)
        })
    }

    fn reserve_inner(
        &self,
        quote_id: &QuoteId,
        account: &str,
        amount_in: Decimal,
    ) -> Result<Reservation> {
        let now = self.clock.now();
        let mut guard = self.state.write();
        let state = &mut *guard;

        let quote = state
            .table
            .quote(quote_id)
            .cloned()
            .ok_or_else(|| StableGateError::QuoteNotFound(quote_id.clone()))?;
        if quote.is_expired(now) {
            state.table.remove_quote(quote_id);
            tracing::debug!(quote_id = %quote_id, "quote expired before reservation");
            return Err(StableGateError::QuoteExpired(quote_id.clone()));
        }
        let runtime = self.asset(&quote.asset)?;
        let cfg = &runtime.config;

        let requested = to_amount_units(amount_in)?;
        if requested != quote.amount {
            return Err(StableGateError::QuoteAmountMismatch {
                quoted: quote.amount,
                requested,
            });
        }

        let sample = state
            .prices
            .fresh(&cfg.base_pair, &cfg.quote_pair, now, state.price_max_age)?;
        if exceeds_slippage(quote.price, sample.rate, cfg.max_slippage_bps) {
            tracing::warn!(
                quote_id = %quote_id,
                quoted = quote.price,
                observed = sample.rate,
                max_bps = cfg.max_slippage_bps,
                "reservation rejected: slippage"
            );
            return Err(StableGateError::SlippageExceeded {
                quoted: quote.price,
                observed: sample.rate,
                max_bps: cfg.max_slippage_bps,
            });
        }

        let amount_out = mul_div_round(requested, quote.price, RATE_SCALE)?;
        if amount_out <= 0 {
            return Err(StableGateError::InvalidAmount {
                reason: format!("{amount_in} converts to zero units at the quoted rate"),
            });
        }

        let day = self.day_of(now);
        if let Err(err) = state.daily.check(day, amount_out, self.daily_cap) {
            tracing::warn!(
                quote_id = %quote_id,
                %day,
                amount = amount_out,
                "reservation rejected: daily cap"
            );
            return Err(err);
        }
        let before = state
            .ledger
            .balance(&quote.asset)
            .ok_or_else(|| StableGateError::NotSupported(quote.asset.clone()))?;
        let after = match state.ledger.preview_reserve(&quote.asset, amount_out) {
            Ok(after) => after,
            Err(err) => {
                tracing::warn!(
                    quote_id = %quote_id,
                    asset = %quote.asset,
                    amount = amount_out,
                    "reservation rejected: inventory"
                );
                return Err(err);
            }
        };
        let usage = state.daily.projected(day, amount_out)?;

        let reservation = Reservation {
            quote_id: quote_id.clone(),
            asset: quote.asset.clone(),
            account: account.trim().to_string(),
            amount_in: requested,
            amount_out,
            price: quote.price,
            expires_at: quote.expires_at,
            reserved_day: day,
        };

        self.persist_reserve(
            &reservation,
            usage,
            state.daily.snapshot(),
            before,
            after,
            now,
        )?;

        state.ledger.reserve(&quote.asset, amount_out)?;
        state.daily.commit(usage);
        state.table.insert_reservation(reservation.clone());
        state.table.remove_quote(quote_id);

        tracing::debug!(
            quote_id = %quote_id,
            asset = %reservation.asset,
            amount_in = requested,
            amount_out,
            "reservation created"
        );
        Ok(reservation)
    }

    /// Persist daily usage, ledger balance and reservation record, undoing
    /// earlier writes if a later one fails.
    fn persist_reserve(
        &self,
        reservation: &Reservation,
        usage: DailyUsage,
        previous_usage: Option<DailyUsage>,
        before: LedgerBalance,
        after: LedgerBalance,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(store) = &self.daily_store {
            store.save_daily_usage(&usage).map_err(persistence)?;
        }
        let Some(ledger) = &self.ledger_store else {
            return Ok(());
        };
        let asset = reservation.asset.as_str();
        if let Err(err) = ledger.save_ledger_balance(&LedgerBalanceRecord::new(asset, after, now)) {
            self.undo_daily(previous_usage, usage.day);
            return Err(persistence(err));
        }
        if let Err(err) = ledger.save_reservation(&ReservationRecord::from(reservation)) {
            self.undo_balance(asset, before, now);
            self.undo_daily(previous_usage, usage.day);
            return Err(persistence(err));
        }
        Ok(())
    }

    fn undo_daily(&self, previous: Option<DailyUsage>, day: NaiveDate) {
        let Some(store) = &self.daily_store else {
            return;
        };
        let restore = previous.unwrap_or_else(|| DailyUsage::new(day, 0));
        if let Err(err) = store.save_daily_usage(&restore) {
            tracing::error!(error = %err, day = %restore.day, "failed to roll back daily usage");
        }
    }

    fn undo_balance(&self, asset: &str, balance: LedgerBalance, now: DateTime<Utc>) {
        let Some(store) = &self.ledger_store else {
            return;
        };
        let record = LedgerBalanceRecord::new(asset, balance, now);
        if let Err(err) = store.save_ledger_balance(&record) {
            tracing::error!(error = %err, asset, "failed to roll back ledger balance");
        }
    }

    // -- cash out ------------------------------------------------------------

    /// Commit a reservation's inventory to a payout.
    ///
    /// # Errors
    /// - `ReservationConsumed` if the reservation was already cashed out
    /// - `ReservationNotFound` if it does not exist
    /// - `ReservationExpired` if it expired (its inventory is released)
    /// - `Persistence` if the ledger store rejects the write
    pub fn create_cash_out_intent(&self, reservation_id: &QuoteId) -> Result<CashOutIntent> {
        self.measured(Operation::CashOut, || self.cash_out_inner(reservation_id))
    }

    fn cash_out_inner(&self, reservation_id: &QuoteId) -> Result<CashOutIntent> {
        let now = self.clock.now();
        let mut guard = self.state.write();
        let state = &mut *guard;

        let reservation = lookup_reservation(&state.table, reservation_id)?;
        if reservation.is_expired(now) {
            self.release_locked(state, &reservation, now, "expired");
            return Err(StableGateError::ReservationExpired(reservation_id.clone()));
        }

        let asset = reservation.asset.as_str();
        let before = state
            .ledger
            .balance(asset)
            .ok_or_else(|| StableGateError::NotSupported(asset.to_string()))?;
        let after = state.ledger.preview_pay_out(asset, reservation.amount_out)?;
        if let Some(store) = &self.ledger_store {
            store
                .save_ledger_balance(&LedgerBalanceRecord::new(asset, after, now))
                .map_err(persistence)?;
            if let Err(err) = store.delete_reservation(reservation_id) {
                self.undo_balance(asset, before, now);
                return Err(persistence(err));
            }
        }

        state.ledger.pay_out(asset, reservation.amount_out)?;
        state.table.take_reservation(reservation_id);
        state.table.mark_consumed(reservation_id.clone())?;

        let intent = CashOutIntent {
            id: IntentId::at(now),
            reservation_id: reservation_id.clone(),
            asset: reservation.asset.clone(),
            account: reservation.account.clone(),
            amount_units: reservation.amount_out,
            created_at: now,
        };
        tracing::info!(
            intent_id = %intent.id,
            quote_id = %reservation_id,
            asset = %intent.asset,
            amount = intent.amount_units,
            "cash-out intent created"
        );
        Ok(intent)
    }

    // -- release -------------------------------------------------------------

    /// Release a reservation's inventory explicitly, for example when a
    /// downstream quota check rejects it.
    ///
    /// # Errors
    /// `ReservationConsumed` or `ReservationNotFound`.
    pub fn cancel_reservation(&self, reservation_id: &QuoteId) -> Result<Reservation> {
        self.measured(Operation::Cancel, || {
            let now = self.clock.now();
            let mut guard = self.state.write();
            let state = &mut *guard;
            let reservation = lookup_reservation(&state.table, reservation_id)?;
            self.release_locked(state, &reservation, now, "cancelled");
            Ok(reservation)
        })
    }

    /// Drop expired quotes and release every expired reservation.
    pub fn sweep_expired(&self) -> SweepReport {
        let started = Instant::now();
        let now = self.clock.now();
        let mut guard = self.state.write();
        let state = &mut *guard;

        let mut report = SweepReport::default();
        for id in state.table.expired_quotes(now) {
            if state.table.remove_quote(&id).is_some() {
                report.expired_quotes += 1;
            }
        }
        for id in state.table.expired_reservations(now) {
            if let Some(reservation) = state.table.reservation(&id).cloned() {
                self.release_locked(state, &reservation, now, "expired");
                report.released_reservations += 1;
            }
        }
        drop(guard);

        if report != SweepReport::default() {
            tracing::info!(
                quotes = report.expired_quotes,
                reservations = report.released_reservations,
                "swept expired entries"
            );
        }
        self.metrics
            .observe(Operation::Sweep, started.elapsed(), Outcome::Ok);
        report
    }

    /// Return a reservation's inventory and daily-cap charge.
    ///
    /// Always succeeds in memory. Store writes are best effort: a failure is
    /// logged and leaves the store overstating usage.
    fn release_locked(
        &self,
        state: &mut EngineState,
        reservation: &Reservation,
        now: DateTime<Utc>,
        reason: &str,
    ) {
        let id = &reservation.quote_id;
        let asset = reservation.asset.as_str();
        state.table.take_reservation(id);

        match state.ledger.release(asset, reservation.amount_out) {
            Ok(balance) => {
                if let Some(store) = &self.ledger_store {
                    if let Err(err) =
                        store.save_ledger_balance(&LedgerBalanceRecord::new(asset, balance, now))
                    {
                        tracing::error!(
                            error = %err,
                            quote_id = %id,
                            "failed to persist released balance"
                        );
                    }
                }
            }
            Err(err) => {
                tracing::error!(error = %err, quote_id = %id, "ledger release failed");
            }
        }

        if let Some(usage) = state.daily.credit(reservation.reserved_day, reservation.amount_out) {
            if let Some(store) = &self.daily_store {
                if let Err(err) = store.save_daily_usage(&usage) {
                    tracing::error!(
                        error = %err,
                        quote_id = %id,
                        "failed to persist credited daily usage"
                    );
                }
            }
        }

        if let Some(store) = &self.ledger_store {
            if let Err(err) = store.delete_reservation(id) {
                tracing::error!(
                    error = %err,
                    quote_id = %id,
                    "failed to delete released reservation"
                );
            }
        }

        tracing::info!(
            quote_id = %id,
            asset,
            amount = reservation.amount_out,
            reason,
            "reservation released"
        );
    }

    // -- reads ---------------------------------------------------------------

    #[must_use]
    pub fn status(&self) -> EngineStatus {
        let state = self.state.read();
        EngineStatus {
            quotes: state.table.quote_count(),
            reservations: state.table.reservation_count(),
            assets: self.assets.len(),
        }
    }

    /// Configured assets in configuration order.
    #[must_use]
    pub fn assets(&self) -> Vec<AssetConfig> {
        self.asset_order
            .iter()
            .filter_map(|key| self.assets.get(key).map(|r| r.config.clone()))
            .collect()
    }

    #[must_use]
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    #[must_use]
    pub fn ledger_balance(&self, asset: &str) -> Option<LedgerBalance> {
        self.state.read().ledger.balance(&normalize_symbol(asset))
    }

    /// Current day bucket, if anything has been charged or restored.
    #[must_use]
    pub fn daily_usage(&self) -> Option<DailyUsage> {
        self.state.read().daily.snapshot()
    }

    /// Units charged against the cap on the clock's current day.
    #[must_use]
    pub fn daily_usage_today(&self) -> i64 {
        let day = self.day_of(self.clock.now());
        self.state.read().daily.current(day)
    }

    /// Check `available + reserved + payouts == inventory` for every asset.
    ///
    /// # Errors
    /// `ConservationViolation` on the first mismatch.
    pub fn verify_conservation(&self) -> Result<()> {
        InventoryConservation::verify_all(&self.state.read().ledger)
    }

    /// Hex digest of the whole inventory ledger.
    #[must_use]
    pub fn ledger_digest(&self) -> String {
        InventoryConservation::ledger_digest(&self.state.read().ledger)
    }

    /// Outstanding reservation, if any.
    #[must_use]
    pub fn reservation(&self, id: &QuoteId) -> Option<Reservation> {
        self.state.read().table.reservation(id).cloned()
    }

    // -- helpers -------------------------------------------------------------

    fn asset(&self, asset: &str) -> Result<&AssetRuntime> {
        let key = normalize_symbol(asset);
        self.assets
            .get(&key)
            .ok_or(StableGateError::NotSupported(key))
    }

    fn day_of(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.cap_offset).date_naive()
    }

    fn measured<T>(&self, op: Operation, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let started = Instant::now();
        let result = f();
        self.metrics.observe(op, started.elapsed(), Outcome::of(&result));
        result
    }
}

fn lookup_reservation(table: &ReservationStore, id: &QuoteId) -> Result<Reservation> {
    if table.is_consumed(id) {
        return Err(StableGateError::ReservationConsumed(id.clone()));
    }
    table
        .reservation(id)
        .cloned()
        .ok_or_else(|| StableGateError::ReservationNotFound(id.clone()))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use stablegate_ledger::MemoryStore;

    use super::*;
    use crate::clock::ManualClock;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 10, 9, 30, 0).unwrap()
    }

    fn znhb() -> AssetConfig {
        AssetConfig::new("ZNHB", "ZNHB", "USD", Decimal::new(1_000, 0))
    }

    fn engine(clock: &ManualClock) -> Engine {
        let engine = Engine::builder(vec![znhb()], Limits::default())
            .clock(clock.clone())
            .build()
            .unwrap();
        engine
            .record_price("ZNHB", "ZNHB", "USD", Decimal::ONE, None)
            .unwrap();
        engine
    }

    #[test]
    fn build_rejects_bad_asset_sets() {
        let err = Engine::builder(vec![], Limits::default()).build().unwrap_err();
        assert!(matches!(err, StableGateError::Configuration(_)));

        let dup = vec![znhb(), AssetConfig::new("znhb", "ZNHB", "USD", Decimal::ONE)];
        let err = Engine::builder(dup, Limits::default()).build().unwrap_err();
        assert!(format!("{err}").contains("duplicate"));

        let blank = vec![AssetConfig::new("  ", "ZNHB", "USD", Decimal::ONE)];
        assert!(Engine::builder(blank, Limits::default()).build().is_err());

        let precise = vec![AssetConfig::new("ZNHB", "ZNHB", "USD", Decimal::new(1, 7))];
        assert!(Engine::builder(precise, Limits::default()).build().is_err());
    }

    #[test]
    fn build_fails_when_daily_store_cannot_load() {
        let store = Arc::new(MemoryStore::new());
        store.fail_loads(true);
        let err = Engine::builder(vec![znhb()], Limits::default())
            .daily_store(store)
            .build()
            .unwrap_err();
        assert!(matches!(err, StableGateError::Persistence(_)));
    }

    #[test]
    fn quote_ids_unique_under_frozen_clock() {
        let clock = ManualClock::new(t0());
        let engine = engine(&clock);
        let a = engine.price("ZNHB", Decimal::ONE).unwrap();
        let b = engine.price("ZNHB", Decimal::ONE).unwrap();
        let c = engine.price("znhb", Decimal::ONE).unwrap();
        assert_ne!(a.id, b.id);
        assert_ne!(b.id, c.id);
        assert_eq!(engine.status().quotes, 3);
    }

    #[test]
    fn record_price_rejects_unknown_asset_and_bad_rate() {
        let clock = ManualClock::new(t0());
        let engine = engine(&clock);
        assert!(matches!(
            engine
                .record_price("BTC", "BTC", "USD", Decimal::ONE, None)
                .unwrap_err(),
            StableGateError::NotSupported(_)
        ));
        assert!(
            engine
                .record_price("ZNHB", "ZNHB", "USD", Decimal::ZERO, None)
                .is_err()
        );
        assert_eq!(engine.latest_price("ZNHB").unwrap().rate, RATE_SCALE);
    }

    #[test]
    fn record_price_rejects_foreign_pair() {
        let clock = ManualClock::new(t0());
        let engine = engine(&clock);
        let err = engine
            .record_price("ZNHB", "ZNHB", "EUR", Decimal::new(2, 0), None)
            .unwrap_err();
        assert!(matches!(err, StableGateError::NotSupported(ref msg) if msg.contains("ZNHB/EUR")));
        assert_eq!(engine.latest_price("ZNHB").unwrap().rate, RATE_SCALE);

        engine
            .record_price("znhb", " znhb ", "usd", Decimal::new(2, 0), None)
            .unwrap();
        assert_eq!(engine.latest_price("ZNHB").unwrap().rate, 2 * RATE_SCALE);
    }

    #[test]
    fn day_bucket_follows_offset() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 7, 10, 23, 30, 0).unwrap());
        let engine = Engine::builder(vec![znhb()], Limits::default())
            .clock(clock.clone())
            .cap_utc_offset(FixedOffset::east_opt(3_600).unwrap())
            .build()
            .unwrap();
        assert_eq!(
            engine.day_of(clock.now()),
            NaiveDate::from_ymd_opt(2024, 7, 11).unwrap()
        );
    }

    #[test]
    fn from_config_applies_settings() {
        let cfg = EngineConfig::from_json(
            r#"{
                "assets": [{ "symbol": "ZNHB", "base": "ZNHB", "quote": "USD",
                             "soft_inventory": "500" }],
                "price_max_age_ms": 1000,
                "tombstone_capacity": 8
            }"#,
        )
        .unwrap();
        let engine = Engine::from_config(&cfg).unwrap().build().unwrap();
        assert_eq!(engine.price_max_age(), Duration::from_secs(1));
        assert_eq!(
            engine.ledger_balance("ZNHB"),
            Some(LedgerBalance::with_inventory(500_000_000))
        );
    }

    #[test]
    fn from_config_opens_store_path() {
        let path = std::env::temp_dir().join(format!(
            "stablegate-engine-config-{}.json",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        let mut cfg = EngineConfig::new(
            vec![znhb()],
            Limits::with_daily_cap(Decimal::new(5_000, 0)),
        );
        cfg.store_path = Some(path.clone());
        let clock = ManualClock::new(t0());

        let engine = Engine::from_config(&cfg)
            .unwrap()
            .clock(clock.clone())
            .build()
            .unwrap();
        engine
            .record_price("ZNHB", "ZNHB", "USD", Decimal::ONE, None)
            .unwrap();
        let quote = engine.price("ZNHB", Decimal::new(40, 0)).unwrap();
        engine.reserve(&quote.id, "acct", Decimal::new(40, 0)).unwrap();
        drop(engine);

        let restored = Engine::from_config(&cfg)
            .unwrap()
            .clock(clock.clone())
            .build()
            .unwrap();
        assert_eq!(restored.daily_usage_today(), 40_000_000);
        assert!(restored.reservation(&quote.id).is_some());
        let _ = std::fs::remove_file(&path);
    }
}
