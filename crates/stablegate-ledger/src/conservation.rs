//! Inventory conservation invariant checker.
//!
//! Invariant enforced after every ledger mutation:
//! ```text
//! ∀ asset: available + reserved + payouts == soft_inventory
//! ```
//!
//! A mismatch means units were created or destroyed outside the
//! reserve / release / pay-out transitions.

use sha2::{Digest, Sha256};
use stablegate_types::{LedgerBalance, Result, StableGateError};

use crate::inventory::InventoryLedger;

/// Stateless conservation checks over ledger balances.
pub struct InventoryConservation;

impl InventoryConservation {
    /// Verify one asset's buckets against its configured inventory.
    ///
    /// # Errors
    /// Returns [`StableGateError::ConservationViolation`] if any bucket is
    /// negative or the buckets do not sum to `soft_inventory`.
    pub fn verify(asset: &str, balance: &LedgerBalance, soft_inventory: i64) -> Result<()> {
        if balance.available < 0 || balance.reserved < 0 || balance.payouts < 0 {
            return Err(StableGateError::ConservationViolation {
                reason: format!(
                    "Asset {asset}: negative bucket (available={}, reserved={}, payouts={})",
                    balance.available, balance.reserved, balance.payouts
                ),
            });
        }
        let total = balance.total();
        if total != i128::from(soft_inventory) {
            return Err(StableGateError::ConservationViolation {
                reason: format!(
                    "Asset {asset}: buckets sum to {total} != inventory {soft_inventory} \
                     (available={}, reserved={}, payouts={})",
                    balance.available, balance.reserved, balance.payouts
                ),
            });
        }
        Ok(())
    }

    /// Verify every registered asset.
    ///
    /// # Errors
    /// The first violation found, in sorted symbol order.
    pub fn verify_all(ledger: &InventoryLedger) -> Result<()> {
        for (asset, inventory, balance) in ledger.entries() {
            Self::verify(&asset, &balance, inventory)?;
        }
        Ok(())
    }

    /// Hex SHA-256 digest over every asset's inventory and buckets.
    ///
    /// Two ledgers in the same state produce the same digest, which lets an
    /// operator compare a restored engine against the one that persisted it.
    #[must_use]
    pub fn ledger_digest(ledger: &InventoryLedger) -> String {
        let mut hasher = Sha256::new();
        hasher.update(b"stablegate:ledger:v1:");
        let entries: Vec<_> = ledger.entries().collect();
        hasher.update((entries.len() as u64).to_le_bytes());
        for (asset, inventory, balance) in entries {
            hasher.update((asset.len() as u64).to_le_bytes());
            hasher.update(asset.as_bytes());
            hasher.update(inventory.to_le_bytes());
            hasher.update(balance.available.to_le_bytes());
            hasher.update(balance.reserved.to_le_bytes());
            hasher.update(balance.payouts.to_le_bytes());
        }
        hex::encode(hasher.finalize())
    }
}
