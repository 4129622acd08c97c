//! # Quote → Reservation → CashOutIntent
//!
//! ## State Machine
//!
//! ```text
//!   ┌────────┐  reserve   ┌──────────┐  cash out   ┌────────────┐
//!   │ QUOTED ├───────────▶│ RESERVED ├────────────▶│ CASHED_OUT │
//!   └───┬────┘            └────┬─────┘             └────────────┘
//!       │ ttl                  │ cancel / ttl
//!       ▼                      ▼
//!   ┌─────────┐         ┌─────────────────────┐
//!   │ EXPIRED │         │ EXPIRED / CANCELLED │
//!   └─────────┘         └─────────────────────┘
//! ```
//!
//! A quote is single-use: reserving it removes it from the quote table.
//! A reservation leaves the table on cash-out, cancel or expiry; inventory
//! it held is either paid out or released back to `available`.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants::{AMOUNT_DECIMALS, RATE_DECIMALS};
use crate::{IntentId, QuoteId, ReservationId};

/// A time-boxed price commitment for a specific asset and amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    /// Asset symbol (normalised).
    pub asset: String,
    /// Locked-in rate, in rate units.
    pub price: i64,
    /// Quoted input amount, in amount units.
    pub amount: i64,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Quote {
    /// Returns `true` once `now` is strictly past the expiry.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    #[must_use]
    pub fn price_decimal(&self) -> Decimal {
        Decimal::new(self.price, RATE_DECIMALS)
    }

    #[must_use]
    pub fn amount_decimal(&self) -> Decimal {
        Decimal::new(self.amount, AMOUNT_DECIMALS)
    }
}

/// A quote committed against inventory and the daily cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// The quote this reservation was made from (also its own ID).
    pub quote_id: ReservationId,
    pub asset: String,
    pub account: String,
    /// Input amount, in amount units.
    pub amount_in: i64,
    /// Output amount held in `reserved`, in amount units.
    pub amount_out: i64,
    /// Rate the output was computed at, in rate units.
    pub price: i64,
    pub expires_at: DateTime<Utc>,
    /// Daily-cap bucket the output was charged to.
    pub reserved_day: NaiveDate,
}

impl Reservation {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    #[must_use]
    pub fn amount_out_decimal(&self) -> Decimal {
        Decimal::new(self.amount_out, AMOUNT_DECIMALS)
    }
}

/// Terminal artifact of a successful cash-out. The engine does not retain it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashOutIntent {
    pub id: IntentId,
    pub reservation_id: ReservationId,
    pub asset: String,
    pub account: String,
    /// Paid-out amount, in amount units.
    pub amount_units: i64,
    pub created_at: DateTime<Utc>,
}

impl CashOutIntent {
    /// Paid-out amount as a decimal.
    #[must_use]
    pub fn amount(&self) -> Decimal {
        Decimal::new(self.amount_units, AMOUNT_DECIMALS)
    }
}

/// Lightweight snapshot of engine table sizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatus {
    /// Outstanding (unreserved) quotes.
    pub quotes: usize,
    /// Outstanding reservations.
    pub reservations: usize,
    /// Configured assets.
    pub assets: usize,
}
