//! Outstanding quotes and reservations.
//!
//! ```text
//!   insert_quote ──► QUOTED ──remove_quote──► (reserved or expired)
//!
//!   insert_reservation ──► RESERVED ──take_reservation──► released
//!                                  └──take + mark_consumed──► CASHED_OUT
//! ```
//!
//! The table owns no ledger state; callers move inventory and then update
//! the table under the same lock.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use stablegate_types::{Quote, QuoteId, Reservation, Result};

use crate::tombstones::ConsumedReservations;

#[derive(Debug)]
pub struct ReservationStore {
    quotes: HashMap<QuoteId, Quote>,
    reservations: HashMap<QuoteId, Reservation>,
    consumed: ConsumedReservations,
}

impl ReservationStore {
    /// An empty store remembering up to `tombstone_capacity` cashed-out IDs.
    #[must_use]
    pub fn new(tombstone_capacity: usize) -> Self {
        Self {
            quotes: HashMap::new(),
            reservations: HashMap::new(),
            consumed: ConsumedReservations::new(tombstone_capacity),
        }
    }

    pub fn insert_quote(&mut self, quote: Quote) {
        self.quotes.insert(quote.id.clone(), quote);
    }

    #[must_use]
    pub fn quote(&self, id: &QuoteId) -> Option<&Quote> {
        self.quotes.get(id)
    }

    #[must_use]
    pub fn contains_quote(&self, id: &QuoteId) -> bool {
        self.quotes.contains_key(id)
    }

    pub fn remove_quote(&mut self, id: &QuoteId) -> Option<Quote> {
        self.quotes.remove(id)
    }

    pub fn insert_reservation(&mut self, reservation: Reservation) {
        self.reservations
            .insert(reservation.quote_id.clone(), reservation);
    }

    #[must_use]
    pub fn reservation(&self, id: &QuoteId) -> Option<&Reservation> {
        self.reservations.get(id)
    }

    pub fn take_reservation(&mut self, id: &QuoteId) -> Option<Reservation> {
        self.reservations.remove(id)
    }

    /// Tombstone a cashed-out reservation ID.
    ///
    /// # Errors
    /// `ReservationConsumed` if the ID is already tombstoned.
    pub fn mark_consumed(&mut self, id: QuoteId) -> Result<()> {
        self.consumed.mark_consumed(id)
    }

    #[must_use]
    pub fn is_consumed(&self, id: &QuoteId) -> bool {
        self.consumed.is_consumed(id)
    }

    #[must_use]
    pub fn quote_count(&self) -> usize {
        self.quotes.len()
    }

    #[must_use]
    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }

    #[must_use]
    pub fn consumed_count(&self) -> usize {
        self.consumed.len()
    }

    /// IDs of quotes expired at `now`, sorted.
    #[must_use]
    pub fn expired_quotes(&self, now: DateTime<Utc>) -> Vec<QuoteId> {
        let mut ids: Vec<QuoteId> = self
            .quotes
            .values()
            .filter(|q| q.is_expired(now))
            .map(|q| q.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// IDs of reservations expired at `now`, sorted.
    #[must_use]
    pub fn expired_reservations(&self, now: DateTime<Utc>) -> Vec<QuoteId> {
        let mut ids: Vec<QuoteId> = self
            .reservations
            .values()
            .filter(|r| r.is_expired(now))
            .map(|r| r.quote_id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Sum of `amount_out` over outstanding reservations of `asset`.
    #[must_use]
    pub fn outstanding_for(&self, asset: &str) -> i128 {
        self.reservations
            .values()
            .filter(|r| r.asset == asset)
            .map(|r| i128::from(r.amount_out))
            .sum()
    }
}
