//! Static per-asset configuration and engine-wide limits.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants;

/// A supported stable asset and its risk parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Asset symbol (e.g., "ZNHB"). Normalised to upper case.
    pub symbol: String,
    /// Oracle base pair (e.g., "ZNHB").
    #[serde(rename = "base")]
    pub base_pair: String,
    /// Oracle quote pair (e.g., "USD").
    #[serde(rename = "quote")]
    pub quote_pair: String,
    /// Quote lifetime. Reservations inherit the quote's expiry.
    #[serde(rename = "quote_ttl_ms", with = "duration_ms", default = "default_quote_ttl")]
    pub quote_ttl: Duration,
    /// Maximum price move between quote and reservation, in basis points.
    #[serde(default = "default_max_slippage_bps")]
    pub max_slippage_bps: u32,
    /// Ceiling on concurrently committable amount, in asset units.
    pub soft_inventory: Decimal,
}

impl AssetConfig {
    #[must_use]
    pub fn new(
        symbol: impl Into<String>,
        base_pair: impl Into<String>,
        quote_pair: impl Into<String>,
        soft_inventory: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            base_pair: base_pair.into(),
            quote_pair: quote_pair.into(),
            quote_ttl: default_quote_ttl(),
            max_slippage_bps: constants::DEFAULT_MAX_SLIPPAGE_BPS,
            soft_inventory,
        }
    }

    #[must_use]
    pub fn with_quote_ttl(mut self, ttl: Duration) -> Self {
        self.quote_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_max_slippage_bps(mut self, bps: u32) -> Self {
        self.max_slippage_bps = bps;
        self
    }

    /// Upper-cased, trimmed symbol used as the engine's lookup key.
    #[must_use]
    pub fn key(&self) -> String {
        normalize_symbol(&self.symbol)
    }

    /// Oracle pair key (e.g., "ZNHB/USD").
    #[must_use]
    pub fn pair_key(&self) -> String {
        pair_key(&self.base_pair, &self.quote_pair)
    }
}

/// Engine-wide issuance limits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// Maximum cumulative reserved amount per calendar day. `None` or zero
    /// disables the cap.
    #[serde(default)]
    pub daily_cap: Option<Decimal>,
}

impl Limits {
    #[must_use]
    pub fn with_daily_cap(cap: Decimal) -> Self {
        Self {
            daily_cap: Some(cap),
        }
    }

    /// The cap if one is actually enforced.
    #[must_use]
    pub fn effective_daily_cap(&self) -> Option<Decimal> {
        self.daily_cap.filter(|cap| *cap > Decimal::ZERO)
    }
}

/// Upper-case and trim an asset symbol.
#[must_use]
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Canonical `BASE/QUOTE` key for an oracle pair.
#[must_use]
pub fn pair_key(base: &str, quote: &str) -> String {
    format!("{}/{}", normalize_symbol(base), normalize_symbol(quote))
}

fn default_quote_ttl() -> Duration {
    Duration::from_millis(constants::DEFAULT_QUOTE_TTL_MS)
}

fn default_max_slippage_bps() -> u32 {
    constants::DEFAULT_MAX_SLIPPAGE_BPS
}

/// Serde adapter for `Duration` as integer milliseconds.
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
