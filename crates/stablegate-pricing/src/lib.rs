//! # stablegate-pricing
//!
//! **Pure pricing plane for StableGate.**
//!
//! Everything here is side-effect free and deterministic:
//!
//! - **Quantizer**: decimal amounts and rates to `i64` fixed-point units,
//!   and the 128-bit `mul_div_round` used for every conversion
//! - **Price cache**: latest oracle sample per pair with staleness checks
//! - **Slippage**: basis-point tolerance between a locked and a live rate

pub mod price_cache;
pub mod quantizer;
pub mod slippage;

pub use price_cache::{PriceCache, PriceSample};
pub use quantizer::{
    from_amount_units, from_rate_units, mul_div_round, to_amount_units, to_rate_units,
};
pub use slippage::exceeds_slippage;
