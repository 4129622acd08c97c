//! Identifiers used throughout StableGate.
//!
//! Quote IDs are derived from the engine clock so they sort by issue time
//! and can be reproduced under a deterministic test clock. A reservation
//! reuses the ID of the quote it was created from.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::QUOTE_ID_PREFIX;

// ---------------------------------------------------------------------------
// QuoteId
// ---------------------------------------------------------------------------

/// Identifier of a quote (and of the reservation made from it).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuoteId(pub String);

impl QuoteId {
    /// Build an ID from a clock reading. `sequence` disambiguates quotes
    /// issued at the same nanosecond (frozen test clocks); zero yields the
    /// plain `q-<nanos>` form.
    #[must_use]
    pub fn from_clock(now: DateTime<Utc>, sequence: u64) -> Self {
        let nanos = now.timestamp_nanos_opt().unwrap_or_else(|| now.timestamp_micros());
        if sequence == 0 {
            Self(format!("{QUOTE_ID_PREFIX}{nanos}"))
        } else {
            Self(format!("{QUOTE_ID_PREFIX}{nanos}-{sequence}"))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for QuoteId {
    fn from(value: &str) -> Self {
        Self(value.trim().to_string())
    }
}

impl From<String> for QuoteId {
    fn from(value: String) -> Self {
        Self(value.trim().to_string())
    }
}

impl fmt::Display for QuoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reservations are keyed by the quote they were made from.
pub type ReservationId = QuoteId;

// ---------------------------------------------------------------------------
// IntentId
// ---------------------------------------------------------------------------

/// Identifier of a cash-out intent. UUIDv7 stamped with the engine clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct IntentId(pub Uuid);

impl IntentId {
    #[must_use]
    pub fn at(now: DateTime<Utc>) -> Self {
        let secs = u64::try_from(now.timestamp()).unwrap_or(0);
        let ts = uuid::Timestamp::from_unix(uuid::NoContext, secs, now.timestamp_subsec_nanos());
        Self(Uuid::new_v7(ts))
    }
}

impl fmt::Display for IntentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
