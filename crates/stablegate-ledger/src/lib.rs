//! # stablegate-ledger
//!
//! **Inventory and limit state for StableGate.**
//!
//! This crate owns every piece of mutable issuance state, without any
//! locking of its own. The engine wraps all of it in one lock.
//!
//! - [`InventoryLedger`]: available / reserved / payouts per asset
//! - [`InventoryConservation`]: `available + reserved + payouts == inventory`
//! - [`DailyCapTracker`]: cumulative reserved amount per day
//! - [`ReservationStore`]: outstanding quotes and reservations
//! - [`ConsumedReservations`]: bounded tombstones for cashed-out IDs
//! - [`DailyUsageStore`] / [`LedgerStore`]: durable persistence seams

pub mod conservation;
pub mod daily_cap;
pub mod inventory;
pub mod reservations;
pub mod store;
pub mod tombstones;

pub use conservation::InventoryConservation;
pub use daily_cap::DailyCapTracker;
pub use inventory::InventoryLedger;
pub use reservations::ReservationStore;
pub use store::{DailyUsageStore, JsonFileStore, LedgerStore, MemoryStore};
pub use tombstones::ConsumedReservations;
