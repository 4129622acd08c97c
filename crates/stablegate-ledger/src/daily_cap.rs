//! Daily issuance cap.
//!
//! A single `(day, amount)` bucket. Usage from a previous day is treated as
//! zero, so the bucket rolls over lazily on the first charge of a new day.
//! Checks and projections are read-only; only [`DailyCapTracker::commit`],
//! [`DailyCapTracker::credit`] and [`DailyCapTracker::restore`] mutate.

use chrono::NaiveDate;
use stablegate_types::{DailyUsage, Result, StableGateError};

#[derive(Debug, Default)]
pub struct DailyCapTracker {
    usage: Option<DailyUsage>,
}

impl DailyCapTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Units charged on `day`. Zero if the bucket belongs to another day.
    #[must_use]
    pub fn current(&self, day: NaiveDate) -> i64 {
        match self.usage {
            Some(u) if u.day == day => u.amount,
            _ => 0,
        }
    }

    /// The raw bucket, whatever day it belongs to.
    #[must_use]
    pub fn snapshot(&self) -> Option<DailyUsage> {
        self.usage
    }

    /// Reject `amount` if it would push `day` past `cap`. `None` disables
    /// the cap.
    ///
    /// # Errors
    /// `DailyCapExceeded` if `current + amount > cap` or the sum overflows.
    pub fn check(&self, day: NaiveDate, amount: i64, cap: Option<i64>) -> Result<()> {
        let Some(cap) = cap else {
            return Ok(());
        };
        let used = self.current(day);
        match used.checked_add(amount) {
            Some(total) if total <= cap => Ok(()),
            _ => Err(StableGateError::DailyCapExceeded {
                used,
                requested: amount,
                cap,
            }),
        }
    }

    /// Usage `day` would have after charging `amount`.
    ///
    /// # Errors
    /// `Overflow` if the total does not fit in `i64`.
    pub fn projected(&self, day: NaiveDate, amount: i64) -> Result<DailyUsage> {
        let total = self
            .current(day)
            .checked_add(amount)
            .ok_or_else(|| StableGateError::Overflow(format!("daily usage for {day}")))?;
        Ok(DailyUsage::new(day, total))
    }

    /// Install a usage produced by [`Self::projected`].
    pub fn commit(&mut self, usage: DailyUsage) {
        self.usage = Some(usage);
    }

    /// Give back `amount` charged on `day`.
    ///
    /// Returns the new bucket when it belongs to `day`; a release of a
    /// reservation made on an earlier day leaves today's bucket untouched.
    pub fn credit(&mut self, day: NaiveDate, amount: i64) -> Option<DailyUsage> {
        let usage = self.usage.as_mut().filter(|u| u.day == day)?;
        usage.amount = usage.amount.saturating_sub(amount).max(0);
        Some(*usage)
    }

    /// Install persisted usage. Negative amounts clamp to zero.
    pub fn restore(&mut self, usage: DailyUsage) {
        self.usage = Some(DailyUsage::new(usage.day, usage.amount.max(0)));
    }
}
