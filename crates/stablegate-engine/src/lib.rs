//! # stablegate-engine
//!
//! **Quote, reserve and cash-out orchestration for StableGate.**
//!
//! The [`Engine`] ties the pure pricing plane (`stablegate-pricing`) to the
//! inventory state (`stablegate-ledger`) under a single lock:
//!
//! 1. `record_price`: oracle feed into the price cache
//! 2. `price`: lock a rate and amount into a short-lived quote
//! 3. `reserve`: hold soft inventory against the quote and charge the daily cap
//! 4. `create_cash_out_intent`: commit the held inventory to a payout
//!
//! Expired or cancelled reservations return their inventory and daily-cap
//! charge. Time comes from an injected [`Clock`]; metrics go to an injected
//! [`EngineMetrics`].

pub mod clock;
pub mod engine;
pub mod metrics;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{Engine, EngineBuilder, SweepReport};
pub use metrics::{EngineMetrics, NoopMetrics, Operation, Outcome, PrometheusMetrics};
