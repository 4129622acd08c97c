//! Engine configuration, loaded from a JSON file.
//!
//! ```json
//! {
//!   "assets": [
//!     { "symbol": "ZNHB", "base": "ZNHB", "quote": "USD",
//!       "quote_ttl_ms": 60000, "max_slippage_bps": 50, "soft_inventory": "1000000" }
//!   ],
//!   "limits": { "daily_cap": "250000" },
//!   "price_max_age_ms": 120000,
//!   "store_path": "/var/data/stablegate.json"
//! }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AssetConfig, Limits, Result, StableGateError, constants};

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Supported assets. At least one is required.
    pub assets: Vec<AssetConfig>,
    /// Engine-wide issuance limits.
    #[serde(default)]
    pub limits: Limits,
    /// Maximum oracle sample age. Zero disables the staleness check.
    #[serde(default = "default_price_max_age_ms")]
    pub price_max_age_ms: u64,
    /// Cashed-out reservation IDs remembered for duplicate detection.
    #[serde(default = "default_tombstone_capacity")]
    pub tombstone_capacity: usize,
    /// Offset from UTC, in seconds, of the day boundary used for the daily cap.
    #[serde(default)]
    pub cap_utc_offset_secs: i32,
    /// Path of the JSON file store. `None` keeps all state in memory.
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

impl EngineConfig {
    /// A configuration with the given assets and every other field defaulted.
    #[must_use]
    pub fn new(assets: Vec<AssetConfig>, limits: Limits) -> Self {
        Self {
            assets,
            limits,
            price_max_age_ms: constants::DEFAULT_PRICE_MAX_AGE_MS,
            tombstone_capacity: constants::DEFAULT_TOMBSTONE_CAPACITY,
            cap_utc_offset_secs: 0,
            store_path: None,
        }
    }

    /// Load and validate configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            StableGateError::Configuration(format!(
                "read {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)
            .map_err(|e| StableGateError::Configuration(format!("parse: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Maximum oracle sample age as a `Duration`.
    #[must_use]
    pub fn price_max_age(&self) -> Duration {
        Duration::from_millis(self.price_max_age_ms)
    }

    /// Check structural invariants the engine relies on.
    pub fn validate(&self) -> Result<()> {
        if self.assets.is_empty() {
            return Err(StableGateError::Configuration(
                "at least one asset must be configured".into(),
            ));
        }
        let mut seen = HashSet::with_capacity(self.assets.len());
        for asset in &self.assets {
            let key = asset.key();
            if key.is_empty() {
                return Err(StableGateError::Configuration("asset missing symbol".into()));
            }
            if !seen.insert(key.clone()) {
                return Err(StableGateError::Configuration(format!(
                    "duplicate asset symbol {key}"
                )));
            }
            if asset.base_pair.trim().is_empty() || asset.quote_pair.trim().is_empty() {
                return Err(StableGateError::Configuration(format!(
                    "asset {key} missing oracle pair"
                )));
            }
            if asset.quote_ttl.is_zero() {
                return Err(StableGateError::Configuration(format!(
                    "asset {key} quote TTL must be positive"
                )));
            }
            if asset.soft_inventory <= Decimal::ZERO {
                return Err(StableGateError::Configuration(format!(
                    "asset {key} soft inventory must be positive"
                )));
            }
        }
        if let Some(cap) = self.limits.daily_cap {
            if cap.is_sign_negative() {
                return Err(StableGateError::Configuration(
                    "daily cap must not be negative".into(),
                ));
            }
        }
        if self.tombstone_capacity == 0 {
            return Err(StableGateError::Configuration(
                "tombstone capacity must be positive".into(),
            ));
        }
        if self.cap_utc_offset_secs.abs() >= 24 * 3600 {
            return Err(StableGateError::Configuration(
                "daily cap UTC offset must be within one day".into(),
            ));
        }
        Ok(())
    }
}

fn default_price_max_age_ms() -> u64 {
    constants::DEFAULT_PRICE_MAX_AGE_MS
}

fn default_tombstone_capacity() -> usize {
    constants::DEFAULT_TOMBSTONE_CAPACITY
}
