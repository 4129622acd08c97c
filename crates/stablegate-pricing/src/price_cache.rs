//! Latest oracle sample per trading pair.
//!
//! The cache holds one [`PriceSample`] per normalised `BASE/QUOTE` key.
//! Reads go through [`PriceCache::fresh`], which refuses samples that are
//! missing, non-positive, or older than the configured maximum age.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use stablegate_types::{Result, StableGateError, pair_key};

/// One observed exchange rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceSample {
    /// Rate in rate units (9 decimals).
    pub rate: i64,
    pub observed_at: DateTime<Utc>,
}

impl PriceSample {
    /// Whether the sample is older than `max_age` at `now`.
    ///
    /// A zero `max_age` never reports staleness. Samples stamped in the
    /// future count as fresh.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        if max_age.is_zero() {
            return false;
        }
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return false;
        };
        now.signed_duration_since(self.observed_at) > max_age
    }
}

/// Pair-keyed oracle price cache.
#[derive(Debug, Default)]
pub struct PriceCache {
    samples: HashMap<String, PriceSample>,
}

impl PriceCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a sample for `base/quote`, replacing whatever was held.
    /// Returns the replaced sample.
    pub fn record(
        &mut self,
        base: &str,
        quote: &str,
        rate: i64,
        observed_at: DateTime<Utc>,
    ) -> Option<PriceSample> {
        self.samples
            .insert(pair_key(base, quote), PriceSample { rate, observed_at })
    }

    #[must_use]
    pub fn latest(&self, base: &str, quote: &str) -> Option<PriceSample> {
        self.samples.get(&pair_key(base, quote)).copied()
    }

    /// The sample for `base/quote` if it is usable at `now`.
    ///
    /// # Errors
    /// `PriceUnavailable` if no sample exists, its rate is not positive,
    /// or it is older than `max_age`.
    pub fn fresh(
        &self,
        base: &str,
        quote: &str,
        now: DateTime<Utc>,
        max_age: Duration,
    ) -> Result<PriceSample> {
        let key = pair_key(base, quote);
        let unavailable = || StableGateError::PriceUnavailable { pair: key.clone() };
        let sample = self.samples.get(&key).copied().ok_or_else(unavailable)?;
        if sample.rate <= 0 || sample.is_stale(now, max_age) {
            return Err(unavailable());
        }
        Ok(sample)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
