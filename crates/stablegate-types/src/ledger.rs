//! Inventory ledger snapshot types.
//!
//! Every asset's soft inventory is split across three buckets:
//! `available` (free to reserve), `reserved` (held by outstanding
//! reservations) and `payouts` (committed to cash-out intents).

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants::AMOUNT_DECIMALS;

/// Ledger balance for one asset, in amount units.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerBalance {
    /// Free to back new reservations.
    pub available: i64,
    /// Held by outstanding reservations.
    pub reserved: i64,
    /// Paid out through cash-out intents.
    pub payouts: i64,
}

impl LedgerBalance {
    /// A fresh ledger with the whole inventory available.
    #[must_use]
    pub fn with_inventory(inventory: i64) -> Self {
        Self {
            available: inventory,
            reserved: 0,
            payouts: 0,
        }
    }

    /// Sum of all three buckets. Must equal the soft inventory.
    /// Widened so a corrupt record cannot overflow the check itself.
    #[must_use]
    pub fn total(&self) -> i128 {
        i128::from(self.available) + i128::from(self.reserved) + i128::from(self.payouts)
    }

    #[must_use]
    pub fn available_amount(&self) -> Decimal {
        Decimal::new(self.available, AMOUNT_DECIMALS)
    }

    #[must_use]
    pub fn reserved_amount(&self) -> Decimal {
        Decimal::new(self.reserved, AMOUNT_DECIMALS)
    }

    #[must_use]
    pub fn payouts_amount(&self) -> Decimal {
        Decimal::new(self.payouts, AMOUNT_DECIMALS)
    }
}

/// Cumulative reserved amount for one calendar day.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyUsage {
    pub day: NaiveDate,
    /// Amount units charged against the daily cap.
    pub amount: i64,
}

impl DailyUsage {
    #[must_use]
    pub fn new(day: NaiveDate, amount: i64) -> Self {
        Self { day, amount }
    }

    #[must_use]
    pub fn amount_decimal(&self) -> Decimal {
        Decimal::new(self.amount, AMOUNT_DECIMALS)
    }
}
