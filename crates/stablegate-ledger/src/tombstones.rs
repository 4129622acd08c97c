//! Cash-out tombstones: prevents double cash-out of a reservation.
//!
//! Each reservation can be cashed out once. Its ID is remembered after the
//! cash-out so a repeated request reports
//! [`StableGateError::ReservationConsumed`] instead of a bare not-found.
//!
//! The set is bounded with oldest-first eviction so memory stays
//! predictable in long-running processes. An evicted ID reports
//! not-found again.

use std::collections::{HashSet, VecDeque};

use stablegate_types::{QuoteId, Result, StableGateError};

/// Bounded set of cashed-out reservation IDs.
#[derive(Debug)]
pub struct ConsumedReservations {
    consumed: HashSet<QuoteId>,
    /// Insertion order for eviction (front = oldest).
    order: VecDeque<QuoteId>,
    max_size: usize,
}

impl ConsumedReservations {
    /// Create a set holding at most `max_size` IDs. A zero size is raised
    /// to one.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            consumed: HashSet::with_capacity(max_size.min(1024)),
            order: VecDeque::with_capacity(max_size.min(1024)),
            max_size,
        }
    }

    /// Record a cash-out.
    ///
    /// # Errors
    /// `ReservationConsumed` if `id` is already recorded.
    pub fn mark_consumed(&mut self, id: QuoteId) -> Result<()> {
        if self.consumed.contains(&id) {
            return Err(StableGateError::ReservationConsumed(id));
        }

        if self.consumed.len() >= self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.consumed.remove(&oldest);
            }
        }

        self.consumed.insert(id.clone());
        self.order.push_back(id);
        Ok(())
    }

    #[must_use]
    pub fn is_consumed(&self, id: &QuoteId) -> bool {
        self.consumed.contains(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.consumed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.consumed.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.max_size
    }
}
