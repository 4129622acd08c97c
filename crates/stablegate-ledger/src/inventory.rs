//! Soft-inventory ledger.
//!
//! Tracks, per asset, how the configured soft inventory is split across
//! `available`, `reserved` and `payouts`. All mutations are atomic: either
//! the full operation succeeds or the balance is unchanged.
//!
//! ```text
//!            reserve              pay_out
//! available ─────────► reserved ─────────► payouts
//!     ▲                   │
//!     └───── release ─────┘
//! ```
//!
//! Every mutation has a `preview_*` twin that computes the resulting balance
//! without applying it, so a caller can persist the new state first and
//! commit only once the write has landed.

use std::collections::HashMap;

use stablegate_types::{LedgerBalance, Result, StableGateError};

#[derive(Debug, Clone, Copy)]
struct AssetLedger {
    soft_inventory: i64,
    balance: LedgerBalance,
}

/// Per-asset inventory balances keyed by normalised symbol.
#[derive(Debug, Default)]
pub struct InventoryLedger {
    assets: HashMap<String, AssetLedger>,
}

impl InventoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an asset with its whole inventory available.
    ///
    /// Re-registering resets the asset's balance.
    pub fn register(&mut self, asset: &str, soft_inventory: i64) {
        self.assets.insert(
            asset.to_string(),
            AssetLedger {
                soft_inventory,
                balance: LedgerBalance::with_inventory(soft_inventory),
            },
        );
    }

    #[must_use]
    pub fn contains(&self, asset: &str) -> bool {
        self.assets.contains_key(asset)
    }

    #[must_use]
    pub fn balance(&self, asset: &str) -> Option<LedgerBalance> {
        self.assets.get(asset).map(|l| l.balance)
    }

    #[must_use]
    pub fn soft_inventory(&self, asset: &str) -> Option<i64> {
        self.assets.get(asset).map(|l| l.soft_inventory)
    }

    /// Registered symbols in sorted order.
    #[must_use]
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.assets.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Read-only check that `amount` could be reserved right now.
    ///
    /// # Errors
    /// `InsufficientReserve` if `available < amount`.
    pub fn ensure_available(&self, asset: &str, amount: i64) -> Result<()> {
        self.preview_reserve(asset, amount).map(|_| ())
    }

    /// Balance after moving `amount` from available to reserved.
    pub fn preview_reserve(&self, asset: &str, amount: i64) -> Result<LedgerBalance> {
        let mut bal = self.entry(asset)?.balance;
        check_positive(amount)?;
        if bal.available < amount {
            return Err(StableGateError::InsufficientReserve {
                needed: amount,
                available: bal.available,
            });
        }
        bal.available -= amount;
        bal.reserved = bal
            .reserved
            .checked_add(amount)
            .ok_or_else(|| overflow(asset, "reserved"))?;
        Ok(bal)
    }

    /// Balance after moving `amount` from reserved back to available.
    pub fn preview_release(&self, asset: &str, amount: i64) -> Result<LedgerBalance> {
        let mut bal = self.entry(asset)?.balance;
        check_positive(amount)?;
        if bal.reserved < amount {
            return Err(underflow(asset, "reserved"));
        }
        bal.reserved -= amount;
        bal.available = bal
            .available
            .checked_add(amount)
            .ok_or_else(|| overflow(asset, "available"))?;
        Ok(bal)
    }

    /// Balance after moving `amount` from reserved to payouts.
    pub fn preview_pay_out(&self, asset: &str, amount: i64) -> Result<LedgerBalance> {
        let mut bal = self.entry(asset)?.balance;
        check_positive(amount)?;
        if bal.reserved < amount {
            return Err(underflow(asset, "reserved"));
        }
        bal.reserved -= amount;
        bal.payouts = bal
            .payouts
            .checked_add(amount)
            .ok_or_else(|| overflow(asset, "payouts"))?;
        Ok(bal)
    }

    /// Reserve inventory (available → reserved).
    ///
    /// # Errors
    /// - `NotSupported` if the asset is not registered
    /// - `InsufficientReserve` if available < amount
    pub fn reserve(&mut self, asset: &str, amount: i64) -> Result<LedgerBalance> {
        let next = self.preview_reserve(asset, amount)?;
        Ok(self.apply(asset, next))
    }

    /// Release a reservation (reserved → available).
    ///
    /// # Errors
    /// `LedgerUnderflow` if reserved < amount.
    pub fn release(&mut self, asset: &str, amount: i64) -> Result<LedgerBalance> {
        let next = self.preview_release(asset, amount)?;
        Ok(self.apply(asset, next))
    }

    /// Commit a reservation to a payout (reserved → payouts).
    ///
    /// # Errors
    /// `LedgerUnderflow` if reserved < amount.
    pub fn pay_out(&mut self, asset: &str, amount: i64) -> Result<LedgerBalance> {
        let next = self.preview_pay_out(asset, amount)?;
        Ok(self.apply(asset, next))
    }

    /// Replace an asset's balance with a persisted one.
    ///
    /// `available` is recomputed from the configured soft inventory so a
    /// changed inventory setting takes effect across restarts. Returns the
    /// balance actually installed.
    ///
    /// # Errors
    /// `ConservationViolation` if a bucket is negative or reserved plus
    /// payouts exceed the configured inventory.
    pub fn restore(&mut self, asset: &str, persisted: LedgerBalance) -> Result<LedgerBalance> {
        let entry = self
            .assets
            .get_mut(asset)
            .ok_or_else(|| StableGateError::NotSupported(asset.to_string()))?;
        if persisted.available < 0 || persisted.reserved < 0 || persisted.payouts < 0 {
            return Err(StableGateError::ConservationViolation {
                reason: format!("asset {asset}: persisted balance has a negative bucket {persisted:?}"),
            });
        }
        let committed = i128::from(persisted.reserved) + i128::from(persisted.payouts);
        let available = i128::from(entry.soft_inventory) - committed;
        let available = i64::try_from(available)
            .ok()
            .filter(|a| *a >= 0)
            .ok_or_else(|| StableGateError::ConservationViolation {
                reason: format!(
                    "asset {asset}: reserved {} + payouts {} exceed inventory {}",
                    persisted.reserved, persisted.payouts, entry.soft_inventory
                ),
            })?;
        if available != persisted.available {
            tracing::info!(
                asset,
                persisted = persisted.available,
                rebased = available,
                "soft inventory changed since last run, rebasing available balance"
            );
        }
        entry.balance = LedgerBalance {
            available,
            reserved: persisted.reserved,
            payouts: persisted.payouts,
        };
        Ok(entry.balance)
    }

    /// Iterate `(symbol, soft_inventory, balance)` in sorted symbol order.
    pub fn entries(&self) -> impl Iterator<Item = (String, i64, LedgerBalance)> + '_ {
        self.symbols().into_iter().filter_map(|symbol| {
            let l = self.assets.get(&symbol)?;
            Some((symbol, l.soft_inventory, l.balance))
        })
    }

    fn entry(&self, asset: &str) -> Result<&AssetLedger> {
        self.assets
            .get(asset)
            .ok_or_else(|| StableGateError::NotSupported(asset.to_string()))
    }

    fn apply(&mut self, asset: &str, next: LedgerBalance) -> LedgerBalance {
        if let Some(entry) = self.assets.get_mut(asset) {
            entry.balance = next;
        }
        next
    }
}

fn check_positive(amount: i64) -> Result<()> {
    if amount <= 0 {
        return Err(StableGateError::InvalidAmount {
            reason: format!("ledger amount must be positive, got {amount} units"),
        });
    }
    Ok(())
}

fn underflow(asset: &str, bucket: &'static str) -> StableGateError {
    StableGateError::LedgerUnderflow {
        asset: asset.to_string(),
        bucket,
    }
}

fn overflow(asset: &str, bucket: &str) -> StableGateError {
    StableGateError::Overflow(format!("{bucket} balance of {asset}"))
}
