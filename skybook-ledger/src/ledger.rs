use chrono::{DateTime, Duration, Utc};
use skybook_core::{Clock, Flight, PaymentMethod};
use skybook_inventory::{InventoryError, SeatInventory, StaleHold};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{
    AttemptResolution, AttemptState, Booking, BookingState, CompensationReason, PaymentAttempt,
};
use crate::store::{BookingStore, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Seat {seat} on flight {flight_id} is already taken")]
    SeatTaken { flight_id: Uuid, seat: String },

    #[error("Booking not found: {0}")]
    BookingNotFound(Uuid),

    #[error("Payment attempt not found: {0}")]
    AttemptNotFound(Uuid),

    #[error("Payment attempt {attempt_id} does not belong to booking {booking_id}")]
    AttemptMismatch { attempt_id: Uuid, booking_id: Uuid },

    #[error("Payment attempt {0} has not completed")]
    AttemptNotCompleted(Uuid),

    #[error("Booking {booking_id} is {state:?}, not held")]
    NotHeld { booking_id: Uuid, state: BookingState },

    #[error("Hold on booking {0} has not expired yet")]
    HoldNotExpired(Uuid),

    #[error("Booking {0} already has a payment in flight")]
    AttemptInProgress(Uuid),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmOutcome {
    Confirmed(Booking),
    /// The same completed attempt confirmed this booking earlier.
    AlreadyConfirmed(Booking),
    /// The booking left Held some other way (expired or cancelled).
    AlreadyResolved(Booking),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompensateOutcome {
    Compensated(Booking),
    AlreadyResolved(Booking),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    Released,
    Repaired,
    Skipped,
}

/// Owns the booking lifecycle. Every booking transition is a compare-and-set
/// on the booking's state, and seat mutations happen only after that CAS
/// commits, so exactly one of racing confirm/compensate calls touches the seat.
pub struct ReservationLedger {
    inventory: Arc<dyn SeatInventory>,
    store: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
}

impl ReservationLedger {
    pub fn new(inventory: Arc<dyn SeatInventory>, store: Arc<dyn BookingStore>, clock: Arc<dyn Clock>) -> Self {
        Self { inventory, store, clock }
    }

    pub fn inventory(&self) -> &Arc<dyn SeatInventory> {
        &self.inventory
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Claim the seat and persist a Held booking. No booking row exists unless
    /// the claim succeeded, and the claim is released if the row cannot be written.
    pub async fn create_hold(
        &self,
        flight: &Flight,
        seat: &str,
        owner_id: &str,
        ttl: Duration,
    ) -> LedgerResult<Booking> {
        let now = self.clock.now();
        let booking_id = Uuid::new_v4();

        let token = match self.inventory.claim(flight.id, seat, booking_id, now + ttl).await {
            Ok(token) => token,
            Err(InventoryError::Conflict { flight_id, seat }) => {
                warn!(%flight_id, %seat, owner_id, "Seat already taken");
                return Err(LedgerError::SeatTaken { flight_id, seat });
            }
            Err(e) => return Err(e.into()),
        };

        let booking = Booking::held(
            booking_id,
            flight.id,
            seat,
            owner_id,
            token,
            flight.fare_cents,
            &flight.currency,
            now,
            ttl,
        );

        if let Err(e) = self.store.insert(&booking).await {
            if let Err(release_err) = self.inventory.release(flight.id, seat, token).await {
                error!(
                    %booking_id,
                    flight_id = %flight.id,
                    seat,
                    "Failed to roll back seat claim after ledger write failure: {}",
                    release_err
                );
            }
            return Err(e.into());
        }

        info!(%booking_id, flight_id = %flight.id, seat, owner_id, deadline = %booking.hold_deadline, "Seat held");
        Ok(booking)
    }

    /// Held → Confirmed, driven by a completed payment attempt. This is the only
    /// path that makes a seat claim permanent. The deadline is not consulted:
    /// a payment that completes late still wins as long as the booking is Held.
    pub async fn confirm(&self, booking_id: Uuid, attempt_id: Uuid) -> LedgerResult<ConfirmOutcome> {
        let attempt = self
            .store
            .get_attempt(attempt_id)
            .await?
            .ok_or(LedgerError::AttemptNotFound(attempt_id))?;
        if attempt.booking_id != booking_id {
            return Err(LedgerError::AttemptMismatch { attempt_id, booking_id });
        }
        if attempt.state != AttemptState::Completed {
            return Err(LedgerError::AttemptNotCompleted(attempt_id));
        }

        loop {
            let booking = self.require(booking_id).await?;
            match booking.state {
                BookingState::Held => {
                    let next = booking.confirmed(attempt_id, self.clock.now());
                    if !self.store.compare_and_set(BookingState::Held, &next).await? {
                        continue;
                    }
                    if let Err(e) = self.inventory.confirm(next.flight_id, &next.seat_number, next.claim_token).await {
                        // A cancellation may have committed and released the seat in between.
                        if let Some(current) = self.store.get(booking_id).await? {
                            if current.state == BookingState::Cancelled {
                                return Ok(ConfirmOutcome::AlreadyResolved(current));
                            }
                        }
                        return Err(self.violation(
                            booking_id,
                            format!("booking {} confirmed but seat {} could not be: {}", booking_id, next.seat_number, e),
                        ));
                    }
                    info!(%booking_id, %attempt_id, seat = %next.seat_number, "Booking confirmed");
                    return Ok(ConfirmOutcome::Confirmed(next));
                }
                BookingState::Confirmed if booking.confirmed_by == Some(attempt_id) => {
                    return Ok(ConfirmOutcome::AlreadyConfirmed(booking));
                }
                BookingState::Confirmed => {
                    return Err(self.violation(
                        booking_id,
                        format!(
                            "booking {} confirmed by {:?}, second completed attempt {}",
                            booking_id, booking.confirmed_by, attempt_id
                        ),
                    ));
                }
                BookingState::Expired | BookingState::Cancelled => {
                    return Ok(ConfirmOutcome::AlreadyResolved(booking));
                }
            }
        }
    }

    /// Held → Expired (timeout) or Held|Confirmed → Cancelled, then release
    /// the seat. The loser of a race with `confirm` gets `AlreadyResolved`
    /// and leaves the seat alone.
    pub async fn compensate(&self, booking_id: Uuid, reason: CompensationReason) -> LedgerResult<CompensateOutcome> {
        loop {
            let booking = self.require(booking_id).await?;
            let allowed = match (booking.state, reason) {
                (BookingState::Held, _) => true,
                (BookingState::Confirmed, CompensationReason::Cancelled) => true,
                _ => false,
            };
            if !allowed {
                return Ok(CompensateOutcome::AlreadyResolved(booking));
            }

            let now = self.clock.now();
            if reason == CompensationReason::Timeout && !booking.is_past_deadline(now) {
                return Err(LedgerError::HoldNotExpired(booking_id));
            }

            let next = booking.compensated(reason, now);
            if !self.store.compare_and_set(booking.state, &next).await? {
                continue;
            }

            match self.inventory.release(next.flight_id, &next.seat_number, next.claim_token).await {
                Ok(()) => {}
                Err(e @ InventoryError::Backend(_)) => {
                    error!(%booking_id, seat = %next.seat_number, "Seat release failed after compensation: {}", e);
                    return Err(e.into());
                }
                Err(e) => {
                    return Err(self.violation(
                        booking_id,
                        format!("booking {} compensated but seat {} not released: {}", booking_id, next.seat_number, e),
                    ));
                }
            }

            info!(
                %booking_id,
                from = booking.state.as_str(),
                to = next.state.as_str(),
                seat = %next.seat_number,
                "Booking compensated, seat released"
            );
            return Ok(CompensateOutcome::Compensated(next));
        }
    }

    /// Open the next payment attempt. Refused while the booking is not Held or
    /// while an earlier attempt could still be charged.
    pub async fn record_attempt(
        &self,
        booking_id: Uuid,
        amount_cents: i64,
        currency: &str,
        method: PaymentMethod,
    ) -> LedgerResult<PaymentAttempt> {
        let booking = self.require(booking_id).await?;
        if booking.state != BookingState::Held {
            return Err(LedgerError::NotHeld { booking_id, state: booking.state });
        }

        let attempts = self.store.attempts_for(booking_id).await?;
        if attempts.iter().any(|a| a.state.is_outstanding()) {
            return Err(LedgerError::AttemptInProgress(booking_id));
        }

        let sequence = attempts.iter().map(|a| a.sequence).max().unwrap_or(0) + 1;
        let attempt = PaymentAttempt::submitted(booking_id, sequence, amount_cents, currency, method, self.clock.now());
        match self.store.insert_attempt(&attempt).await {
            Ok(()) => Ok(attempt),
            Err(StorageError::Duplicate(_)) => Err(LedgerError::AttemptInProgress(booking_id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Record what the gateway said. Re-reporting the same terminal outcome is
    /// a no-op; contradicting it, or completing a second attempt for one
    /// booking, is refused.
    pub async fn resolve_attempt(&self, attempt_id: Uuid, resolution: AttemptResolution) -> LedgerResult<PaymentAttempt> {
        loop {
            let attempt = self.require_attempt(attempt_id).await?;
            let target = resolution.state();

            if attempt.state == target {
                return Ok(attempt);
            }
            if !attempt.state.is_outstanding() {
                return Err(LedgerError::InvalidTransition {
                    from: attempt.state.as_str().to_string(),
                    to: target.as_str().to_string(),
                });
            }

            if target == AttemptState::Completed {
                let siblings = self.store.attempts_for(attempt.booking_id).await?;
                if let Some(other) = siblings
                    .iter()
                    .find(|a| a.id != attempt_id && a.state == AttemptState::Completed)
                {
                    return Err(self.violation(
                        attempt.booking_id,
                        format!(
                            "attempt {} completed but attempt {} already completed for booking {}",
                            attempt_id, other.id, attempt.booking_id
                        ),
                    ));
                }
            }

            let next = attempt.resolved(&resolution, self.clock.now());
            if self.store.update_attempt(attempt.state, &next).await? {
                info!(
                    booking_id = %attempt.booking_id,
                    %attempt_id,
                    key = %attempt.idempotency_key,
                    state = next.state.as_str(),
                    "Payment attempt resolved"
                );
                return Ok(next);
            }
        }
    }

    pub async fn booking(&self, booking_id: Uuid) -> LedgerResult<Option<Booking>> {
        Ok(self.store.get(booking_id).await?)
    }

    pub async fn attempt(&self, attempt_id: Uuid) -> LedgerResult<Option<PaymentAttempt>> {
        Ok(self.store.get_attempt(attempt_id).await?)
    }

    pub async fn attempts_for(&self, booking_id: Uuid) -> LedgerResult<Vec<PaymentAttempt>> {
        Ok(self.store.attempts_for(booking_id).await?)
    }

    /// The attempt that may still be charged, if any.
    pub async fn outstanding_attempt(&self, booking_id: Uuid) -> LedgerResult<Option<PaymentAttempt>> {
        Ok(self
            .store
            .attempts_for(booking_id)
            .await?
            .into_iter()
            .find(|a| a.state.is_outstanding()))
    }

    pub async fn bookings_for_owner(&self, owner_id: &str) -> LedgerResult<Vec<Booking>> {
        Ok(self.store.list_by_owner(owner_id).await?)
    }

    pub async fn all_bookings(&self) -> LedgerResult<Vec<Booking>> {
        Ok(self.store.list().await?)
    }

    pub async fn held_past(&self, now: DateTime<Utc>) -> LedgerResult<Vec<Booking>> {
        Ok(self.store.held_past(now).await?)
    }

    /// Bring a lapsed held cell back in line with its booking: release it when
    /// no live booking owns it, or finish the seat half of a confirmation that
    /// was interrupted. Cells whose booking is still Held are left for expiry.
    pub async fn reconcile_stale_hold(&self, stale: &StaleHold) -> LedgerResult<Reconciliation> {
        let owner = self.store.get(stale.booking_id).await?;
        let owned = owner.as_ref().filter(|b| b.claim_token == stale.token);

        match owned.map(|b| b.state) {
            Some(BookingState::Held) => Ok(Reconciliation::Skipped),
            Some(BookingState::Confirmed) => {
                self.inventory.confirm(stale.flight_id, &stale.seat_number, stale.token).await?;
                warn!(booking_id = %stale.booking_id, seat = %stale.seat_number, "Repaired seat of confirmed booking");
                Ok(Reconciliation::Repaired)
            }
            _ => match self.inventory.release(stale.flight_id, &stale.seat_number, stale.token).await {
                Ok(()) => {
                    warn!(
                        booking_id = %stale.booking_id,
                        flight_id = %stale.flight_id,
                        seat = %stale.seat_number,
                        "Released orphaned seat hold"
                    );
                    Ok(Reconciliation::Released)
                }
                // Someone else moved the cell since it was listed.
                Err(InventoryError::ClaimMismatch { .. }) => Ok(Reconciliation::Skipped),
                Err(e) => Err(e.into()),
            },
        }
    }

    async fn require(&self, booking_id: Uuid) -> LedgerResult<Booking> {
        self.store
            .get(booking_id)
            .await?
            .ok_or(LedgerError::BookingNotFound(booking_id))
    }

    async fn require_attempt(&self, attempt_id: Uuid) -> LedgerResult<PaymentAttempt> {
        self.store
            .get_attempt(attempt_id)
            .await?
            .ok_or(LedgerError::AttemptNotFound(attempt_id))
    }

    fn violation(&self, booking_id: Uuid, detail: String) -> LedgerError {
        error!(%booking_id, "INVARIANT VIOLATION: {}", detail);
        LedgerError::InvariantViolation(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use skybook_core::ManualClock;
    use skybook_inventory::{MemorySeatInventory, SeatClaim};
    use crate::store::{MemoryBookingStore, StorageResult};

    struct Fixture {
        ledger: Arc<ReservationLedger>,
        inventory: Arc<MemorySeatInventory>,
        clock: Arc<ManualClock>,
        flight: Flight,
    }

    async fn fixture() -> Fixture {
        let inventory = Arc::new(MemorySeatInventory::new());
        let clock = Arc::new(ManualClock::default());
        let flight = Flight::new("SB100", 20, 15_000, "USD").with_seats_per_row(1);
        inventory.provision(&flight).await.unwrap();
        let ledger = Arc::new(ReservationLedger::new(
            inventory.clone(),
            Arc::new(MemoryBookingStore::new()),
            clock.clone(),
        ));
        Fixture { ledger, inventory, clock, flight }
    }

    async fn completed_attempt(ledger: &ReservationLedger, booking_id: Uuid) -> PaymentAttempt {
        let attempt = ledger
            .record_attempt(booking_id, 15_000, "USD", PaymentMethod::Card)
            .await
            .unwrap();
        ledger
            .resolve_attempt(attempt.id, AttemptResolution::Completed { transaction_id: "txn_1".to_string() })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_hold_conflict_leaves_no_row() {
        let f = fixture().await;
        let first = f.ledger.create_hold(&f.flight, "12A", "alice", Duration::minutes(10)).await.unwrap();
        assert_eq!(first.state, BookingState::Held);
        assert_eq!(first.fare_cents, 15_000);

        let second = f.ledger.create_hold(&f.flight, "12A", "bob", Duration::minutes(10)).await;
        assert!(matches!(second, Err(LedgerError::SeatTaken { .. })));
        assert_eq!(f.ledger.all_bookings().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_confirm_is_idempotent() {
        let f = fixture().await;
        let booking = f.ledger.create_hold(&f.flight, "12A", "alice", Duration::minutes(10)).await.unwrap();
        let attempt = completed_attempt(&f.ledger, booking.id).await;

        let first = f.ledger.confirm(booking.id, attempt.id).await.unwrap();
        let second = f.ledger.confirm(booking.id, attempt.id).await.unwrap();

        assert!(matches!(first, ConfirmOutcome::Confirmed(_)));
        assert!(matches!(second, ConfirmOutcome::AlreadyConfirmed(_)));
        assert!(matches!(
            f.inventory.claim_state(f.flight.id, "12A").await.unwrap(),
            SeatClaim::Confirmed { .. }
        ));
    }

    #[tokio::test]
    async fn test_confirm_requires_completed_attempt() {
        let f = fixture().await;
        let booking = f.ledger.create_hold(&f.flight, "3A", "alice", Duration::minutes(10)).await.unwrap();
        let attempt = f
            .ledger
            .record_attempt(booking.id, 15_000, "USD", PaymentMethod::Card)
            .await
            .unwrap();

        assert!(matches!(
            f.ledger.confirm(booking.id, attempt.id).await,
            Err(LedgerError::AttemptNotCompleted(_))
        ));
        assert!(matches!(
            f.ledger.confirm(Uuid::new_v4(), attempt.id).await,
            Err(LedgerError::AttemptMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_timeout_after_confirm_is_already_resolved() {
        let f = fixture().await;
        let booking = f.ledger.create_hold(&f.flight, "12A", "alice", Duration::seconds(5)).await.unwrap();
        let attempt = completed_attempt(&f.ledger, booking.id).await;
        f.ledger.confirm(booking.id, attempt.id).await.unwrap();

        f.clock.advance(Duration::seconds(6));
        let outcome = f.ledger.compensate(booking.id, CompensationReason::Timeout).await.unwrap();

        match outcome {
            CompensateOutcome::AlreadyResolved(b) => assert_eq!(b.state, BookingState::Confirmed),
            other => panic!("expected AlreadyResolved, got {:?}", other),
        }
        assert!(!f.inventory.claim_state(f.flight.id, "12A").await.unwrap().is_free());
    }

    #[tokio::test]
    async fn test_timeout_before_deadline_is_refused() {
        let f = fixture().await;
        let booking = f.ledger.create_hold(&f.flight, "5A", "alice", Duration::seconds(5)).await.unwrap();

        assert!(matches!(
            f.ledger.compensate(booking.id, CompensationReason::Timeout).await,
            Err(LedgerError::HoldNotExpired(_))
        ));

        f.clock.advance(Duration::seconds(5));
        let outcome = f.ledger.compensate(booking.id, CompensationReason::Timeout).await.unwrap();
        assert!(matches!(outcome, CompensateOutcome::Compensated(ref b) if b.state == BookingState::Expired));
        assert!(f.inventory.claim_state(f.flight.id, "5A").await.unwrap().is_free());

        let again = f.ledger.compensate(booking.id, CompensationReason::Timeout).await.unwrap();
        assert!(matches!(again, CompensateOutcome::AlreadyResolved(_)));
    }

    #[tokio::test]
    async fn test_cancel_confirmed_releases_seat() {
        let f = fixture().await;
        let booking = f.ledger.create_hold(&f.flight, "12A", "alice", Duration::minutes(10)).await.unwrap();
        let attempt = completed_attempt(&f.ledger, booking.id).await;
        f.ledger.confirm(booking.id, attempt.id).await.unwrap();

        let outcome = f.ledger.compensate(booking.id, CompensationReason::Cancelled).await.unwrap();
        assert!(matches!(outcome, CompensateOutcome::Compensated(ref b) if b.state == BookingState::Cancelled));

        let rebooked = f.ledger.create_hold(&f.flight, "12A", "bob", Duration::minutes(10)).await.unwrap();
        assert_eq!(rebooked.owner_id, "bob");
    }

    #[tokio::test]
    async fn test_attempt_rules() {
        let f = fixture().await;
        let booking = f.ledger.create_hold(&f.flight, "7A", "alice", Duration::minutes(10)).await.unwrap();

        let first = f
            .ledger
            .record_attempt(booking.id, 15_000, "USD", PaymentMethod::Card)
            .await
            .unwrap();
        assert_eq!(first.sequence, 1);
        assert!(matches!(
            f.ledger.record_attempt(booking.id, 15_000, "USD", PaymentMethod::Card).await,
            Err(LedgerError::AttemptInProgress(_))
        ));

        f.ledger
            .resolve_attempt(first.id, AttemptResolution::Failed { reason: "card declined".to_string() })
            .await
            .unwrap();
        let second = f
            .ledger
            .record_attempt(booking.id, 15_000, "USD", PaymentMethod::Card)
            .await
            .unwrap();
        assert_eq!(second.sequence, 2);
        assert_eq!(second.idempotency_key.as_str(), format!("{}:2", booking.id));

        assert!(matches!(
            f.ledger
                .resolve_attempt(first.id, AttemptResolution::Completed { transaction_id: "late".to_string() })
                .await,
            Err(LedgerError::InvalidTransition { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_confirm_racing_timeout_has_one_winner() {
        for _ in 0..20 {
            let f = fixture().await;
            let booking = f.ledger.create_hold(&f.flight, "9A", "alice", Duration::seconds(5)).await.unwrap();
            let attempt = completed_attempt(&f.ledger, booking.id).await;
            f.clock.advance(Duration::seconds(10));

            let confirm = {
                let ledger = f.ledger.clone();
                tokio::spawn(async move { ledger.confirm(booking.id, attempt.id).await })
            };
            let expire = {
                let ledger = f.ledger.clone();
                tokio::spawn(async move { ledger.compensate(booking.id, CompensationReason::Timeout).await })
            };

            let confirmed = matches!(confirm.await.unwrap().unwrap(), ConfirmOutcome::Confirmed(_));
            let expired = matches!(expire.await.unwrap().unwrap(), CompensateOutcome::Compensated(_));
            assert!(confirmed ^ expired);

            let final_state = f.ledger.booking(booking.id).await.unwrap().unwrap().state;
            let seat = f.inventory.claim_state(f.flight.id, "9A").await.unwrap();
            match final_state {
                BookingState::Confirmed => assert!(matches!(seat, SeatClaim::Confirmed { .. })),
                BookingState::Expired => assert!(seat.is_free()),
                other => panic!("unexpected state {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_orphaned_hold_is_released() {
        let f = fixture().await;
        let now = f.clock.now();
        let orphan = f
            .inventory
            .claim(f.flight.id, "4A", Uuid::new_v4(), now - Duration::seconds(1))
            .await
            .unwrap();
        let live = f.ledger.create_hold(&f.flight, "6A", "alice", Duration::seconds(1)).await.unwrap();
        f.clock.advance(Duration::seconds(2));

        let stale = f.inventory.held_before(f.clock.now()).await.unwrap();
        assert_eq!(stale.len(), 2);
        for hold in &stale {
            let result = f.ledger.reconcile_stale_hold(hold).await.unwrap();
            if hold.token == orphan {
                assert_eq!(result, Reconciliation::Released);
            } else {
                assert_eq!(hold.booking_id, live.id);
                assert_eq!(result, Reconciliation::Skipped);
            }
        }
        assert!(f.inventory.claim_state(f.flight.id, "4A").await.unwrap().is_free());
        assert!(!f.inventory.claim_state(f.flight.id, "6A").await.unwrap().is_free());
    }

    struct FailingStore;

    #[async_trait]
    impl BookingStore for FailingStore {
        async fn insert(&self, _booking: &Booking) -> StorageResult<()> {
            Err(StorageError::Backend("disk full".to_string()))
        }
        async fn get(&self, _id: Uuid) -> StorageResult<Option<Booking>> {
            Ok(None)
        }
        async fn compare_and_set(&self, _expected: BookingState, _next: &Booking) -> StorageResult<bool> {
            Ok(false)
        }
        async fn held_past(&self, _now: DateTime<Utc>) -> StorageResult<Vec<Booking>> {
            Ok(vec![])
        }
        async fn list_by_owner(&self, _owner_id: &str) -> StorageResult<Vec<Booking>> {
            Ok(vec![])
        }
        async fn list(&self) -> StorageResult<Vec<Booking>> {
            Ok(vec![])
        }
        async fn insert_attempt(&self, _attempt: &PaymentAttempt) -> StorageResult<()> {
            Ok(())
        }
        async fn get_attempt(&self, _id: Uuid) -> StorageResult<Option<PaymentAttempt>> {
            Ok(None)
        }
        async fn update_attempt(&self, _expected: AttemptState, _next: &PaymentAttempt) -> StorageResult<bool> {
            Ok(false)
        }
        async fn attempts_for(&self, _booking_id: Uuid) -> StorageResult<Vec<PaymentAttempt>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_failed_ledger_write_rolls_back_claim() {
        let inventory = Arc::new(MemorySeatInventory::new());
        let flight = Flight::new("SB100", 20, 15_000, "USD").with_seats_per_row(1);
        inventory.provision(&flight).await.unwrap();
        let ledger = ReservationLedger::new(inventory.clone(), Arc::new(FailingStore), Arc::new(ManualClock::default()));

        let result = ledger.create_hold(&flight, "12A", "alice", Duration::minutes(10)).await;
        assert!(matches!(result, Err(LedgerError::Storage(_))));
        assert!(inventory.claim_state(flight.id, "12A").await.unwrap().is_free());
    }
}
