use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{AttemptState, Booking, BookingState, PaymentAttempt};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Durable home of bookings and payment attempts. State changes go through
/// compare-and-set so concurrent writers to one booking cannot both win.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn insert(&self, booking: &Booking) -> StorageResult<()>;

    async fn get(&self, id: Uuid) -> StorageResult<Option<Booking>>;

    /// Write `next` iff the stored booking is still in `expected`. Returns
    /// false when another writer got there first.
    async fn compare_and_set(&self, expected: BookingState, next: &Booking) -> StorageResult<bool>;

    async fn held_past(&self, now: DateTime<Utc>) -> StorageResult<Vec<Booking>>;

    async fn list_by_owner(&self, owner_id: &str) -> StorageResult<Vec<Booking>>;

    async fn list(&self) -> StorageResult<Vec<Booking>>;

    /// Fails with `Duplicate` if the booking already has an attempt with this sequence.
    async fn insert_attempt(&self, attempt: &PaymentAttempt) -> StorageResult<()>;

    async fn get_attempt(&self, id: Uuid) -> StorageResult<Option<PaymentAttempt>>;

    async fn update_attempt(&self, expected: AttemptState, next: &PaymentAttempt) -> StorageResult<bool>;

    /// Attempts for a booking ordered by sequence.
    async fn attempts_for(&self, booking_id: Uuid) -> StorageResult<Vec<PaymentAttempt>>;
}

#[derive(Default)]
pub struct MemoryBookingStore {
    bookings: RwLock<HashMap<Uuid, Booking>>,
    attempts: RwLock<HashMap<Uuid, PaymentAttempt>>,
}

impl MemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut bookings: Vec<Booking>) -> Vec<Booking> {
    bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    bookings
}

#[async_trait]
impl BookingStore for MemoryBookingStore {
    async fn insert(&self, booking: &Booking) -> StorageResult<()> {
        let mut bookings = self.bookings.write().await;
        if bookings.contains_key(&booking.id) {
            return Err(StorageError::Duplicate(format!("booking {}", booking.id)));
        }
        bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StorageResult<Option<Booking>> {
        Ok(self.bookings.read().await.get(&id).cloned())
    }

    async fn compare_and_set(&self, expected: BookingState, next: &Booking) -> StorageResult<bool> {
        let mut bookings = self.bookings.write().await;
        match bookings.get_mut(&next.id) {
            Some(current) if current.state == expected => {
                *current = next.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn held_past(&self, now: DateTime<Utc>) -> StorageResult<Vec<Booking>> {
        let mut held: Vec<Booking> = self
            .bookings
            .read()
            .await
            .values()
            .filter(|b| b.is_past_deadline(now))
            .cloned()
            .collect();
        held.sort_by(|a, b| a.hold_deadline.cmp(&b.hold_deadline));
        Ok(held)
    }

    async fn list_by_owner(&self, owner_id: &str) -> StorageResult<Vec<Booking>> {
        let bookings = self.bookings.read().await;
        Ok(newest_first(
            bookings.values().filter(|b| b.owner_id == owner_id).cloned().collect(),
        ))
    }

    async fn list(&self) -> StorageResult<Vec<Booking>> {
        Ok(newest_first(self.bookings.read().await.values().cloned().collect()))
    }

    async fn insert_attempt(&self, attempt: &PaymentAttempt) -> StorageResult<()> {
        let mut attempts = self.attempts.write().await;
        let taken = attempts
            .values()
            .any(|a| a.booking_id == attempt.booking_id && a.sequence == attempt.sequence);
        if taken || attempts.contains_key(&attempt.id) {
            return Err(StorageError::Duplicate(attempt.idempotency_key.to_string()));
        }
        attempts.insert(attempt.id, attempt.clone());
        Ok(())
    }

    async fn get_attempt(&self, id: Uuid) -> StorageResult<Option<PaymentAttempt>> {
        Ok(self.attempts.read().await.get(&id).cloned())
    }

    async fn update_attempt(&self, expected: AttemptState, next: &PaymentAttempt) -> StorageResult<bool> {
        let mut attempts = self.attempts.write().await;
        match attempts.get_mut(&next.id) {
            Some(current) if current.state == expected => {
                *current = next.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn attempts_for(&self, booking_id: Uuid) -> StorageResult<Vec<PaymentAttempt>> {
        let mut attempts: Vec<PaymentAttempt> = self
            .attempts
            .read()
            .await
            .values()
            .filter(|a| a.booking_id == booking_id)
            .cloned()
            .collect();
        attempts.sort_by_key(|a| a.sequence);
        Ok(attempts)
    }
}
