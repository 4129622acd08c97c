//! Time source abstraction.
//!
//! The engine never reads the wall clock directly. Expiry, staleness, day
//! buckets and IDs all derive from an injected [`Clock`]:
//! - [`SystemClock`] for production
//! - [`ManualClock`] for deterministic tests
//! - any `Fn() -> DateTime<Utc>` closure

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

pub trait Clock: Send + Sync {
    /// Current time according to this clock.
    fn now(&self) -> DateTime<Utc>;

    /// Identifier for logs.
    fn name(&self) -> &str {
        "Clock"
    }
}

impl<F> Clock for F
where
    F: Fn() -> DateTime<Utc> + Send + Sync,
{
    fn now(&self) -> DateTime<Utc> {
        self()
    }

    fn name(&self) -> &str {
        "FnClock"
    }
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn name(&self) -> &str {
        "SystemClock"
    }
}

/// Settable clock. Clones share the same instant, so a test can keep one
/// handle and give another to the engine.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(start)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.write();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }

    fn name(&self) -> &str {
        "ManualClock"
    }
}
