//! System-wide constants for the StableGate engine.

/// Fractional digits carried by amount units (1 unit = 0.000001).
pub const AMOUNT_DECIMALS: u32 = 6;

/// Fixed-point scale for amounts.
pub const AMOUNT_SCALE: i64 = 1_000_000;

/// Fractional digits carried by rate units (1 unit = 0.000000001).
pub const RATE_DECIMALS: u32 = 9;

/// Fixed-point scale for exchange rates.
pub const RATE_SCALE: i64 = 1_000_000_000;

/// Basis points in 100%.
pub const BPS_DENOMINATOR: i64 = 10_000;

/// Default maximum age of an oracle sample before it is considered stale (5 minutes).
pub const DEFAULT_PRICE_MAX_AGE_MS: u64 = 5 * 60 * 1000;

/// Default quote lifetime (1 minute).
pub const DEFAULT_QUOTE_TTL_MS: u64 = 60 * 1000;

/// Default slippage tolerance between quote and reservation (0.5%).
pub const DEFAULT_MAX_SLIPPAGE_BPS: u32 = 50;

/// Number of cashed-out reservation IDs remembered for `ReservationConsumed` reporting.
pub const DEFAULT_TOMBSTONE_CAPACITY: usize = 100_000;

/// Prefix for quote identifiers.
pub const QUOTE_ID_PREFIX: &str = "q-";
