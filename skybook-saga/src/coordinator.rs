use chrono::{DateTime, Utc};
use serde::Serialize;
use skybook_core::{
    ChargeOutcome, ChargeRequest, ChargeStatus, EventSink, Flight, FlightCatalog, GatewayError, PaymentDetails,
    PaymentGateway, Principal,
};
use skybook_inventory::{InventoryError, OccupiedSeat};
use skybook_ledger::{
    AttemptResolution, AttemptState, Booking, BookingState, CompensateOutcome, CompensationReason, ConfirmOutcome,
    LedgerError, PaymentAttempt, Reconciliation, ReservationLedger,
};
use skybook_shared::models::events::{
    BookingConfirmedEvent, PaymentUnresolvedEvent, RefundRequestedEvent, SeatHeldEvent, SeatReleasedEvent,
};
use skybook_shared::BookingEvent;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{SagaError, SagaResult};
use crate::policy::SagaPolicy;

/// Answer to `pay`.
#[derive(Debug, Clone, PartialEq)]
pub enum PayOutcome {
    Confirmed(Booking),
    /// The gateway has not said yet. The hold is kept until it does.
    Pending { booking: Booking, attempt_id: Uuid },
    /// Declined. The hold stays; another attempt is allowed while time remains.
    Rejected { booking: Booking, attempt_id: Uuid, reason: String },
}

/// Where an attempt ended up after talking to the gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    NothingOutstanding,
    Confirmed(Booking),
    Declined { attempt: PaymentAttempt, reason: String },
    Pending(PaymentAttempt),
    /// Charged after the booking had already been resolved; a refund was requested.
    Refunded { booking: Booking, attempt: PaymentAttempt },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpireOutcome {
    Expired(Booking),
    AlreadyResolved(Booking),
    /// A charge may still land; the hold is kept.
    PaymentPending(PaymentAttempt),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrphanReport {
    pub released: usize,
    pub repaired: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingStatus {
    #[serde(flatten)]
    pub booking: Booking,
    pub hold_seconds_remaining: i64,
    pub payment_state: Option<AttemptState>,
}

fn normalize_seat(seat: &str) -> String {
    seat.trim().to_ascii_uppercase()
}

/// Drives a booking from hold to its outcome: reserve → pay → confirm, or
/// compensate on timeout and cancellation. Holds no locks across steps; each
/// step is a single-cell or single-booking compare-and-set in the ledger.
pub struct SagaCoordinator {
    catalog: Arc<dyn FlightCatalog>,
    ledger: Arc<ReservationLedger>,
    gateway: Arc<dyn PaymentGateway>,
    events: Arc<dyn EventSink>,
    policy: SagaPolicy,
    /// Attempts this process is currently submitting, with a count per attempt.
    submitting: Mutex<HashMap<Uuid, usize>>,
}

/// Keeps an attempt marked as submitting until dropped, so a cancelled
/// submit future unmarks it too.
struct Submitting<'a> {
    marks: &'a Mutex<HashMap<Uuid, usize>>,
    attempt_id: Uuid,
}

impl<'a> Submitting<'a> {
    fn mark(marks: &'a Mutex<HashMap<Uuid, usize>>, attempt_id: Uuid) -> Self {
        *marks.lock().unwrap_or_else(PoisonError::into_inner).entry(attempt_id).or_insert(0) += 1;
        Self { marks, attempt_id }
    }
}

impl Drop for Submitting<'_> {
    fn drop(&mut self) {
        let mut marks = self.marks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = marks.get_mut(&self.attempt_id) {
            *count -= 1;
            if *count == 0 {
                marks.remove(&self.attempt_id);
            }
        }
    }
}

impl SagaCoordinator {
    pub fn new(
        catalog: Arc<dyn FlightCatalog>,
        ledger: Arc<ReservationLedger>,
        gateway: Arc<dyn PaymentGateway>,
        events: Arc<dyn EventSink>,
        policy: SagaPolicy,
    ) -> Self {
        Self {
            catalog,
            ledger,
            gateway,
            events,
            policy,
            submitting: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &SagaPolicy {
        &self.policy
    }

    pub fn ledger(&self) -> &Arc<ReservationLedger> {
        &self.ledger
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.ledger.now()
    }

    /// Register every catalog flight with the seat inventory.
    pub async fn provision_catalog(&self) -> SagaResult<usize> {
        let flights = self.catalog.flights().await?;
        for flight in &flights {
            self.ledger.inventory().provision(flight).await?;
        }
        info!(flights = flights.len(), "Seat inventory provisioned from catalog");
        Ok(flights.len())
    }

    async fn flight(&self, flight_id: Uuid) -> SagaResult<Flight> {
        self.catalog
            .flight(flight_id)
            .await?
            .ok_or(SagaError::FlightNotFound(flight_id))
    }

    /// Reserving → Held.
    pub async fn reserve(&self, flight_id: Uuid, seat: &str, principal: &Principal) -> SagaResult<Booking> {
        let flight = self.flight(flight_id).await?;
        let seat = normalize_seat(seat);
        if seat.is_empty() {
            return Err(SagaError::InvalidRequest("seat is required".to_string()));
        }

        let booking = match self.ledger.create_hold(&flight, &seat, &principal.id, self.policy.hold_ttl).await {
            Err(LedgerError::Inventory(InventoryError::FlightNotFound(_))) => {
                // First booking on a flight added to the catalog after startup.
                self.ledger.inventory().provision(&flight).await?;
                self.ledger
                    .create_hold(&flight, &seat, &principal.id, self.policy.hold_ttl)
                    .await?
            }
            other => other?,
        };

        self.publish(BookingEvent::SeatHeld(SeatHeldEvent {
            flight_id: booking.flight_id,
            seat_number: booking.seat_number.clone(),
            booking_id: booking.id,
            owner_id: booking.owner_id.clone(),
            held_at: booking.created_at.timestamp(),
            expires_at: booking.hold_deadline.timestamp(),
        }))
        .await;
        Ok(booking)
    }

    /// Held → Confirming → Confirmed | Held (declined) | Pending (ambiguous).
    pub async fn pay(&self, booking_id: Uuid, details: &PaymentDetails, principal: &Principal) -> SagaResult<PayOutcome> {
        let booking = self.owned_booking(booking_id, principal).await?;

        match booking.state {
            BookingState::Held => {}
            BookingState::Confirmed => {
                debug!(%booking_id, "Pay on confirmed booking, nothing to charge");
                return Ok(PayOutcome::Confirmed(booking));
            }
            BookingState::Expired => return Err(SagaError::HoldExpired(booking_id)),
            BookingState::Cancelled => {
                return Err(SagaError::InvalidState { booking_id, state: booking.state });
            }
        }

        if details.amount_cents != booking.fare_cents || !details.currency.eq_ignore_ascii_case(&booking.currency) {
            warn!(%booking_id, expected = booking.fare_cents, actual = details.amount_cents, "Amount mismatch");
            return Err(SagaError::AmountMismatch {
                expected_cents: booking.fare_cents,
                currency: booking.currency.clone(),
                actual_cents: details.amount_cents,
                actual_currency: details.currency.clone(),
            });
        }

        // An earlier attempt may still charge. Resolve it before opening another.
        if let Some(outstanding) = self.ledger.outstanding_attempt(booking_id).await? {
            let request = self.charge_request(&booking, &outstanding, details);
            let resubmit = (!booking.is_past_deadline(self.now())).then_some(&request);
            let settlement = self
                .settle_attempt(&booking, outstanding, self.policy.poll_attempts, resubmit)
                .await?;
            match settlement {
                Settlement::Declined { .. } | Settlement::NothingOutstanding => {}
                other => return self.pay_outcome(booking_id, other).await,
            }
        }

        if booking.is_past_deadline(self.now()) {
            self.expire(booking_id).await?;
            return Err(SagaError::HoldExpired(booking_id));
        }

        let attempt = match self
            .ledger
            .record_attempt(booking_id, details.amount_cents, &booking.currency, details.method)
            .await
        {
            Ok(attempt) => attempt,
            Err(LedgerError::AttemptInProgress(_)) => {
                // Lost a race with a concurrent pay on the same booking.
                return match self.ledger.outstanding_attempt(booking_id).await? {
                    Some(other) => Ok(PayOutcome::Pending { booking, attempt_id: other.id }),
                    None => Err(SagaError::PaymentInFlight(booking_id)),
                };
            }
            Err(LedgerError::NotHeld { state: BookingState::Expired, .. }) => {
                // The sweeper expired the hold after it was read.
                return Err(SagaError::HoldExpired(booking_id));
            }
            Err(e) => return Err(e.into()),
        };

        let request = self.charge_request(&booking, &attempt, details);
        info!(
            %booking_id,
            attempt_id = %attempt.id,
            key = %attempt.idempotency_key,
            method = details.method.as_str(),
            amount = details.amount_cents,
            "Submitting payment"
        );

        let settlement = match self.submit_charge(attempt.id, &request).await {
            ChargeOutcome::Completed { transaction_id } => {
                self.apply_resolution(booking_id, attempt, AttemptResolution::Completed { transaction_id })
                    .await?
            }
            ChargeOutcome::Failed { reason } => {
                warn!(%booking_id, attempt_id = %attempt.id, "Payment declined: {}", reason);
                self.apply_resolution(booking_id, attempt, AttemptResolution::Failed { reason })
                    .await?
            }
            ChargeOutcome::Unknown => {
                warn!(%booking_id, attempt_id = %attempt.id, "Payment outcome unknown, polling");
                match self.apply_resolution(booking_id, attempt, AttemptResolution::Unknown).await? {
                    Settlement::Pending(attempt) => {
                        self.settle_attempt(&booking, attempt, self.policy.poll_attempts, Some(&request))
                            .await?
                    }
                    other => other,
                }
            }
        };

        self.pay_outcome(booking_id, settlement).await
    }

    async fn pay_outcome(&self, booking_id: Uuid, settlement: Settlement) -> SagaResult<PayOutcome> {
        match settlement {
            Settlement::Confirmed(booking) => Ok(PayOutcome::Confirmed(booking)),
            Settlement::Pending(attempt) => {
                let booking = self.require(booking_id).await?;
                Ok(PayOutcome::Pending { booking, attempt_id: attempt.id })
            }
            Settlement::Declined { attempt, reason } => {
                let booking = self.require(booking_id).await?;
                Ok(PayOutcome::Rejected { booking, attempt_id: attempt.id, reason })
            }
            Settlement::Refunded { booking, attempt } => match booking.state {
                BookingState::Expired => Err(SagaError::HoldExpired(booking_id)),
                BookingState::Confirmed => Ok(PayOutcome::Confirmed(booking)),
                BookingState::Held => Ok(PayOutcome::Rejected {
                    booking,
                    attempt_id: attempt.id,
                    reason: "charge arrived after the attempt was written off and is being refunded".to_string(),
                }),
                BookingState::Cancelled => Err(SagaError::InvalidState { booking_id, state: booking.state }),
            },
            Settlement::NothingOutstanding => {
                let booking = self.require(booking_id).await?;
                Err(SagaError::InvalidState { booking_id, state: booking.state })
            }
        }
    }

    /// Submit with a timeout, retrying transport failures under the same key.
    /// Exhausted retries are `Unknown`: the charge may have gone through.
    async fn submit_charge(&self, attempt_id: Uuid, request: &ChargeRequest) -> ChargeOutcome {
        let _submitting = Submitting::mark(&self.submitting, attempt_id);
        let mut retry = 0;
        loop {
            let failure = match tokio::time::timeout(self.policy.gateway_timeout, self.gateway.submit(request)).await {
                Ok(Ok(outcome)) => return outcome,
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("no answer within {:?}", self.policy.gateway_timeout),
            };

            if retry >= self.policy.submit_retries {
                warn!(key = %request.idempotency_key, retries = retry, "Gateway submit gave up: {}", failure);
                return ChargeOutcome::Unknown;
            }
            let delay = self.policy.backoff(retry);
            warn!(key = %request.idempotency_key, retry, ?delay, "Gateway submit failed, retrying: {}", failure);
            tokio::time::sleep(delay).await;
            retry += 1;
        }
    }

    /// Whether a submit of `attempt` may still be on its way to the gateway:
    /// this process is submitting it, or it was opened less than one full
    /// submit window ago.
    fn submit_in_flight(&self, attempt: &PaymentAttempt) -> bool {
        let local = self
            .submitting
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&attempt.id);
        let window = chrono::Duration::from_std(self.policy.submit_window()).unwrap_or(chrono::Duration::MAX);
        local || self.now() - attempt.submitted_at < window
    }

    /// Ask the gateway about an outstanding attempt up to `polls` times.
    /// An unknown key is resubmitted when `resubmit` is given. Without it the
    /// charge is taken as never having reached the processor, unless a
    /// submit may still be in flight.
    async fn settle_attempt(
        &self,
        booking: &Booking,
        attempt: PaymentAttempt,
        polls: u32,
        resubmit: Option<&ChargeRequest>,
    ) -> SagaResult<Settlement> {
        for round in 0..polls {
            if round > 0 {
                tokio::time::sleep(self.policy.poll_interval).await;
            }

            let query = tokio::time::timeout(
                self.policy.gateway_timeout,
                self.gateway.query_status(&attempt.idempotency_key),
            )
            .await;
            let status = match query {
                Ok(Ok(status)) => status,
                Ok(Err(GatewayError::UnknownKey(_))) => match resubmit {
                    Some(request) => {
                        debug!(key = %attempt.idempotency_key, "Gateway has no record, resubmitting same key");
                        match self.submit_charge(attempt.id, request).await {
                            ChargeOutcome::Completed { transaction_id } => ChargeStatus::Completed { transaction_id },
                            ChargeOutcome::Failed { reason } => ChargeStatus::Failed { reason },
                            ChargeOutcome::Unknown => ChargeStatus::Pending,
                        }
                    }
                    None if self.submit_in_flight(&attempt) => {
                        debug!(key = %attempt.idempotency_key, "Gateway has no record yet, submit still in flight");
                        ChargeStatus::Pending
                    }
                    None => ChargeStatus::Failed {
                        reason: "charge never reached the processor".to_string(),
                    },
                },
                Ok(Err(e)) => {
                    warn!(key = %attempt.idempotency_key, "Status query failed: {}", e);
                    ChargeStatus::Pending
                }
                Err(_) => {
                    warn!(key = %attempt.idempotency_key, "Status query timed out");
                    ChargeStatus::Pending
                }
            };

            match status {
                ChargeStatus::Completed { transaction_id } => {
                    return self
                        .apply_resolution(booking.id, attempt, AttemptResolution::Completed { transaction_id })
                        .await;
                }
                ChargeStatus::Failed { reason } => {
                    warn!(booking_id = %booking.id, attempt_id = %attempt.id, "Payment resolved as failed: {}", reason);
                    return self
                        .apply_resolution(booking.id, attempt, AttemptResolution::Failed { reason })
                        .await;
                }
                ChargeStatus::Pending => {}
            }
        }

        if attempt.state == AttemptState::Submitted {
            return self.apply_resolution(booking.id, attempt, AttemptResolution::Unknown).await;
        }
        Ok(Settlement::Pending(attempt))
    }

    /// Record a gateway answer and carry it through. When someone else has
    /// already resolved the attempt, their record wins, except that a
    /// completed charge on an attempt written off as failed is refunded.
    async fn apply_resolution(
        &self,
        booking_id: Uuid,
        attempt: PaymentAttempt,
        resolution: AttemptResolution,
    ) -> SagaResult<Settlement> {
        let completed = matches!(resolution, AttemptResolution::Completed { .. });
        let current = match self.ledger.resolve_attempt(attempt.id, resolution).await {
            Ok(resolved) => resolved,
            Err(LedgerError::InvalidTransition { .. }) => {
                let current = self.ledger.attempt(attempt.id).await?.unwrap_or(attempt);
                if completed && current.state != AttemptState::Completed {
                    return self.refund_stray_charge(booking_id, current).await;
                }
                current
            }
            Err(e) => return Err(e.into()),
        };

        match current.state {
            AttemptState::Completed => self.finalize(booking_id, current).await,
            AttemptState::Failed => Ok(Settlement::Declined {
                reason: current.failure_reason.clone().unwrap_or_default(),
                attempt: current,
            }),
            AttemptState::Submitted | AttemptState::Unknown => Ok(Settlement::Pending(current)),
        }
    }

    /// The gateway captured a charge the ledger had already written off.
    async fn refund_stray_charge(&self, booking_id: Uuid, attempt: PaymentAttempt) -> SagaResult<Settlement> {
        error!(
            %booking_id,
            attempt_id = %attempt.id,
            state = attempt.state.as_str(),
            "Charge completed on an attempt already resolved, requesting refund"
        );
        self.request_refund(
            &attempt,
            format!("payment completed after attempt was recorded {}", attempt.state.as_str()),
        )
        .await;
        let booking = self.require(booking_id).await?;
        Ok(Settlement::Refunded { booking, attempt })
    }

    /// Completed attempt → Ledger.confirm. A charge that lands on a booking
    /// already resolved is refunded, never applied to the seat.
    async fn finalize(&self, booking_id: Uuid, attempt: PaymentAttempt) -> SagaResult<Settlement> {
        match self.ledger.confirm(booking_id, attempt.id).await? {
            ConfirmOutcome::Confirmed(booking) => {
                self.publish(BookingEvent::BookingConfirmed(BookingConfirmedEvent {
                    booking_id,
                    flight_id: booking.flight_id,
                    seat_number: booking.seat_number.clone(),
                    owner_id: booking.owner_id.clone(),
                    payment_attempt_id: attempt.id,
                    amount_cents: attempt.amount_cents,
                    currency: attempt.currency.clone(),
                    timestamp: self.now().timestamp(),
                }))
                .await;
                Ok(Settlement::Confirmed(booking))
            }
            ConfirmOutcome::AlreadyConfirmed(booking) => Ok(Settlement::Confirmed(booking)),
            ConfirmOutcome::AlreadyResolved(booking) if booking.confirmed_by == Some(attempt.id) => {
                // Cancelled right after confirming; the cancellation requested the refund.
                debug!(%booking_id, attempt_id = %attempt.id, "Booking cancelled during confirmation");
                Ok(Settlement::Refunded { booking, attempt })
            }
            ConfirmOutcome::AlreadyResolved(booking) => {
                warn!(
                    %booking_id,
                    attempt_id = %attempt.id,
                    state = booking.state.as_str(),
                    "Payment completed after booking was resolved, requesting refund"
                );
                self.request_refund(&attempt, format!("payment completed after booking was {}", booking.state.as_str()))
                    .await;
                Ok(Settlement::Refunded { booking, attempt })
            }
        }
    }

    /// One status query for a booking's outstanding attempt, without resubmitting.
    pub async fn resolve_pending(&self, booking_id: Uuid) -> SagaResult<Settlement> {
        let booking = self.require(booking_id).await?;
        match self.ledger.outstanding_attempt(booking_id).await? {
            None => Ok(Settlement::NothingOutstanding),
            Some(attempt) => self.settle_attempt(&booking, attempt, 1, None).await,
        }
    }

    /// Held → Expiring → Expired. Never while a charge may still land.
    pub async fn expire(&self, booking_id: Uuid) -> SagaResult<ExpireOutcome> {
        if let Some(attempt) = self.ledger.outstanding_attempt(booking_id).await? {
            return Ok(ExpireOutcome::PaymentPending(attempt));
        }

        match self.ledger.compensate(booking_id, CompensationReason::Timeout).await? {
            CompensateOutcome::Compensated(booking) => {
                self.announce_release(&booking, CompensationReason::Timeout).await;
                Ok(ExpireOutcome::Expired(booking))
            }
            CompensateOutcome::AlreadyResolved(booking) => Ok(ExpireOutcome::AlreadyResolved(booking)),
        }
    }

    /// Held | Confirmed → Cancelling → Cancelled. A confirmed booking's charge
    /// is refunded and its seat released.
    pub async fn cancel(&self, booking_id: Uuid, principal: &Principal) -> SagaResult<Booking> {
        self.owned_booking(booking_id, principal).await?;

        if self.ledger.outstanding_attempt(booking_id).await?.is_some() {
            match self.resolve_pending(booking_id).await? {
                Settlement::Pending(_) => return Err(SagaError::PaymentInFlight(booking_id)),
                other => debug!(%booking_id, "Outstanding payment settled before cancel: {:?}", other),
            }
        }

        match self.ledger.compensate(booking_id, CompensationReason::Cancelled).await? {
            CompensateOutcome::Compensated(cancelled) => {
                info!(%booking_id, by = %principal.id, "Booking cancelled");
                self.announce_release(&cancelled, CompensationReason::Cancelled).await;
                if let Some(attempt_id) = cancelled.confirmed_by {
                    match self.ledger.attempt(attempt_id).await? {
                        Some(attempt) => self.request_refund(&attempt, "booking cancelled".to_string()).await,
                        None => error!(%booking_id, %attempt_id, "Confirmed booking has no payment attempt on record"),
                    }
                }
                Ok(cancelled)
            }
            CompensateOutcome::AlreadyResolved(current) if current.state == BookingState::Cancelled => Ok(current),
            CompensateOutcome::AlreadyResolved(current) => {
                Err(SagaError::InvalidState { booking_id, state: current.state })
            }
        }
    }

    pub async fn status(&self, booking_id: Uuid, principal: &Principal) -> SagaResult<BookingStatus> {
        let booking = self.owned_booking(booking_id, principal).await?;
        let payment_state = self.ledger.attempts_for(booking_id).await?.last().map(|a| a.state);
        Ok(BookingStatus {
            hold_seconds_remaining: booking.seconds_remaining(self.now()),
            booking,
            payment_state,
        })
    }

    pub async fn attempts(&self, booking_id: Uuid, principal: &Principal) -> SagaResult<Vec<PaymentAttempt>> {
        self.owned_booking(booking_id, principal).await?;
        Ok(self.ledger.attempts_for(booking_id).await?)
    }

    pub async fn bookings_for(&self, principal: &Principal) -> SagaResult<Vec<Booking>> {
        Ok(self.ledger.bookings_for_owner(&principal.id).await?)
    }

    /// Read-only admin view.
    pub async fn all_bookings(&self, principal: &Principal) -> SagaResult<Vec<Booking>> {
        if !principal.is_admin() {
            return Err(SagaError::Forbidden(Uuid::nil()));
        }
        Ok(self.ledger.all_bookings().await?)
    }

    /// Seats currently held or confirmed on a flight.
    pub async fn occupied_seats(&self, flight_id: Uuid) -> SagaResult<Vec<OccupiedSeat>> {
        let flight = self.flight(flight_id).await?;
        match self.ledger.inventory().occupied(flight_id).await {
            Ok(seats) => Ok(seats),
            Err(InventoryError::FlightNotFound(_)) => {
                self.ledger.inventory().provision(&flight).await?;
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Admin capacity edit. The inventory is resized first so a shrink below
    /// claimed seats is rejected before the catalog changes.
    pub async fn update_capacity(&self, flight_id: Uuid, total_seats: u32, principal: &Principal) -> SagaResult<Flight> {
        if !principal.is_admin() {
            return Err(SagaError::Forbidden(flight_id));
        }
        let flight = self.flight(flight_id).await?;
        let inventory = self.ledger.inventory();

        match inventory.resize(flight_id, total_seats).await {
            Err(InventoryError::FlightNotFound(_)) => {
                inventory.provision(&flight).await?;
                inventory.resize(flight_id, total_seats).await?;
            }
            other => other?,
        }

        let updated = self.catalog.update_capacity(flight_id, total_seats).await?;
        info!(%flight_id, total_seats, by = %principal.id, "Flight capacity updated");
        Ok(updated)
    }

    /// Release lapsed seat holds that no live booking owns.
    pub async fn reconcile_orphans(&self, now: DateTime<Utc>) -> SagaResult<OrphanReport> {
        let mut report = OrphanReport::default();
        for stale in self.ledger.inventory().held_before(now).await? {
            match self.ledger.reconcile_stale_hold(&stale).await? {
                Reconciliation::Released => {
                    report.released += 1;
                    if let Some(booking) = self.ledger.booking(stale.booking_id).await? {
                        self.publish(BookingEvent::SeatReleased(SeatReleasedEvent {
                            booking_id: booking.id,
                            flight_id: stale.flight_id,
                            seat_number: stale.seat_number.clone(),
                            owner_id: booking.owner_id,
                            reason: CompensationReason::Timeout.as_str().to_string(),
                            timestamp: now.timestamp(),
                        }))
                        .await;
                    }
                }
                Reconciliation::Repaired => report.repaired += 1,
                Reconciliation::Skipped => {}
            }
        }
        Ok(report)
    }

    /// Tell operators a charge has stayed ambiguous for too long.
    pub async fn alert_unresolved(&self, attempt: &PaymentAttempt, now: DateTime<Utc>) {
        let unresolved_for = now - attempt.submitted_at;
        warn!(
            booking_id = %attempt.booking_id,
            attempt_id = %attempt.id,
            key = %attempt.idempotency_key,
            seconds = unresolved_for.num_seconds(),
            "Payment still unresolved"
        );
        self.publish(BookingEvent::PaymentUnresolved(PaymentUnresolvedEvent {
            booking_id: attempt.booking_id,
            payment_attempt_id: attempt.id,
            idempotency_key: attempt.idempotency_key.to_string(),
            unresolved_for_seconds: unresolved_for.num_seconds(),
            timestamp: now.timestamp(),
        }))
        .await;
    }

    async fn owned_booking(&self, booking_id: Uuid, principal: &Principal) -> SagaResult<Booking> {
        let booking = self.require(booking_id).await?;
        if !principal.may_act_for(&booking.owner_id) {
            warn!(%booking_id, caller = %principal.id, "Caller does not own booking");
            return Err(SagaError::Forbidden(booking_id));
        }
        Ok(booking)
    }

    async fn require(&self, booking_id: Uuid) -> SagaResult<Booking> {
        self.ledger
            .booking(booking_id)
            .await?
            .ok_or(SagaError::BookingNotFound(booking_id))
    }

    fn charge_request(&self, booking: &Booking, attempt: &PaymentAttempt, details: &PaymentDetails) -> ChargeRequest {
        ChargeRequest {
            booking_id: booking.id,
            amount_cents: attempt.amount_cents,
            currency: attempt.currency.clone(),
            method: attempt.method,
            token: details.token.clone(),
            idempotency_key: attempt.idempotency_key.clone(),
        }
    }

    async fn announce_release(&self, booking: &Booking, reason: CompensationReason) {
        self.publish(BookingEvent::SeatReleased(SeatReleasedEvent {
            booking_id: booking.id,
            flight_id: booking.flight_id,
            seat_number: booking.seat_number.clone(),
            owner_id: booking.owner_id.clone(),
            reason: reason.as_str().to_string(),
            timestamp: self.now().timestamp(),
        }))
        .await;
    }

    async fn request_refund(&self, attempt: &PaymentAttempt, reason: String) {
        info!(booking_id = %attempt.booking_id, attempt_id = %attempt.id, "Refund requested: {}", reason);
        self.publish(BookingEvent::RefundRequested(RefundRequestedEvent {
            booking_id: attempt.booking_id,
            payment_attempt_id: attempt.id,
            idempotency_key: attempt.idempotency_key.to_string(),
            amount_cents: attempt.amount_cents,
            currency: attempt.currency.clone(),
            reason,
            timestamp: self.now().timestamp(),
        }))
        .await;
    }

    async fn publish(&self, event: BookingEvent) {
        if let Err(e) = self.events.publish(&event).await {
            warn!(booking_id = %event.booking_id(), event = event.name(), "Failed to publish event: {}", e);
        }
    }
}
