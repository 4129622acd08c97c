//! # stablegate-types
//!
//! Shared types, errors, and configuration for the **StableGate**
//! stable-asset quote/reservation engine.
//!
//! This crate is the leaf dependency of the workspace. Every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`QuoteId`], [`ReservationId`], [`IntentId`]
//! - **Asset model**: [`AssetConfig`], [`Limits`]
//! - **Lifecycle model**: [`Quote`], [`Reservation`], [`CashOutIntent`], [`EngineStatus`]
//! - **Ledger model**: [`LedgerBalance`], [`DailyUsage`]
//! - **Persistence records**: [`LedgerBalanceRecord`], [`ReservationRecord`]
//! - **Configuration**: [`EngineConfig`]
//! - **Errors**: [`StableGateError`] with `SG_ERR_` prefix codes
//! - **Constants**: unit scales and defaults

pub mod asset;
pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod quote;
pub mod record;

pub use asset::*;
pub use config::*;
pub use error::*;
pub use ids::*;
pub use ledger::*;
pub use quote::*;
pub use record::*;

// Constants are accessed via `stablegate_types::constants::FOO`
// (not re-exported to avoid name collisions).
