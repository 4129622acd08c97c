//! Persistence records exchanged with durable stores.
//!
//! Records carry raw units so a restored engine reproduces the exact ledger
//! it persisted; decimals never round-trip through storage.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{LedgerBalance, QuoteId, Reservation};

/// Persisted ledger balances for one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerBalanceRecord {
    pub asset: String,
    pub available: i64,
    pub reserved: i64,
    pub payouts: i64,
    pub updated_at: DateTime<Utc>,
}

impl LedgerBalanceRecord {
    #[must_use]
    pub fn new(asset: &str, balance: LedgerBalance, updated_at: DateTime<Utc>) -> Self {
        Self {
            asset: asset.to_string(),
            available: balance.available,
            reserved: balance.reserved,
            payouts: balance.payouts,
            updated_at,
        }
    }

    #[must_use]
    pub fn balance(&self) -> LedgerBalance {
        LedgerBalance {
            available: self.available,
            reserved: self.reserved,
            payouts: self.payouts,
        }
    }
}

/// Persisted outstanding reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRecord {
    pub id: QuoteId,
    pub asset: String,
    pub account: String,
    pub amount_in: i64,
    pub amount_out: i64,
    pub price: i64,
    pub expires_at: DateTime<Utc>,
    pub reserved_day: NaiveDate,
}

impl From<&Reservation> for ReservationRecord {
    fn from(res: &Reservation) -> Self {
        Self {
            id: res.quote_id.clone(),
            asset: res.asset.clone(),
            account: res.account.clone(),
            amount_in: res.amount_in,
            amount_out: res.amount_out,
            price: res.price,
            expires_at: res.expires_at,
            reserved_day: res.reserved_day,
        }
    }
}

impl From<ReservationRecord> for Reservation {
    fn from(rec: ReservationRecord) -> Self {
        Self {
            quote_id: rec.id,
            asset: rec.asset,
            account: rec.account,
            amount_in: rec.amount_in,
            amount_out: rec.amount_out,
            price: rec.price,
            expires_at: rec.expires_at,
            reserved_day: rec.reserved_day,
        }
    }
}
