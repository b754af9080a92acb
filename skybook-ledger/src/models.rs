use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use skybook_core::{IdempotencyKey, PaymentMethod};
use skybook_inventory::ClaimToken;
use uuid::Uuid;

/// Booking status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingState {
    Held,
    Confirmed,
    Expired,
    Cancelled,
}

impl BookingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingState::Held => "HELD",
            BookingState::Confirmed => "CONFIRMED",
            BookingState::Expired => "EXPIRED",
            BookingState::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingState::Expired | BookingState::Cancelled)
    }
}

impl std::str::FromStr for BookingState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HELD" => Ok(BookingState::Held),
            "CONFIRMED" => Ok(BookingState::Confirmed),
            "EXPIRED" => Ok(BookingState::Expired),
            "CANCELLED" => Ok(BookingState::Cancelled),
            other => Err(format!("unknown booking state {}", other)),
        }
    }
}

/// Why a booking was compensated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompensationReason {
    Timeout,
    Cancelled,
}

impl CompensationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompensationReason::Timeout => "TIMEOUT",
            CompensationReason::Cancelled => "CANCELLED",
        }
    }

    pub fn target_state(&self) -> BookingState {
        match self {
            CompensationReason::Timeout => BookingState::Expired,
            CompensationReason::Cancelled => BookingState::Cancelled,
        }
    }
}

impl std::str::FromStr for CompensationReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TIMEOUT" => Ok(CompensationReason::Timeout),
            "CANCELLED" => Ok(CompensationReason::Cancelled),
            other => Err(format!("unknown compensation reason {}", other)),
        }
    }
}

/// One customer's claim on one seat, from hold to its final outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub flight_id: Uuid,
    pub seat_number: String,
    pub owner_id: String,
    pub state: BookingState,
    pub created_at: DateTime<Utc>,
    /// Persisted, so expiry survives restarts and disconnected clients.
    pub hold_deadline: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing, default)]
    pub claim_token: ClaimToken,
    /// Fare snapshot taken from the catalog at reserve time.
    pub fare_cents: i64,
    pub currency: String,
    pub confirmed_by: Option<Uuid>,
    pub compensation_reason: Option<CompensationReason>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    #[allow(clippy::too_many_arguments)]
    pub fn held(
        id: Uuid,
        flight_id: Uuid,
        seat_number: &str,
        owner_id: &str,
        claim_token: ClaimToken,
        fare_cents: i64,
        currency: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id,
            flight_id,
            seat_number: seat_number.to_string(),
            owner_id: owner_id.to_string(),
            state: BookingState::Held,
            created_at: now,
            hold_deadline: now + ttl,
            confirmed_at: None,
            resolved_at: None,
            claim_token,
            fare_cents,
            currency: currency.to_string(),
            confirmed_by: None,
            compensation_reason: None,
            updated_at: now,
        }
    }

    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.state == BookingState::Held && now >= self.hold_deadline
    }

    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
        if self.state != BookingState::Held {
            return 0;
        }
        (self.hold_deadline - now).num_seconds().max(0)
    }

    pub(crate) fn confirmed(&self, attempt_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            state: BookingState::Confirmed,
            confirmed_at: Some(now),
            confirmed_by: Some(attempt_id),
            updated_at: now,
            ..self.clone()
        }
    }

    pub(crate) fn compensated(&self, reason: CompensationReason, now: DateTime<Utc>) -> Self {
        Self {
            state: reason.target_state(),
            resolved_at: Some(now),
            compensation_reason: Some(reason),
            updated_at: now,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptState {
    Submitted,
    Completed,
    Failed,
    Unknown,
}

impl AttemptState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptState::Submitted => "SUBMITTED",
            AttemptState::Completed => "COMPLETED",
            AttemptState::Failed => "FAILED",
            AttemptState::Unknown => "UNKNOWN",
        }
    }

    /// The gateway may still charge (or already has) under this attempt.
    pub fn is_outstanding(&self) -> bool {
        matches!(self, AttemptState::Submitted | AttemptState::Unknown)
    }
}

impl std::str::FromStr for AttemptState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUBMITTED" => Ok(AttemptState::Submitted),
            "COMPLETED" => Ok(AttemptState::Completed),
            "FAILED" => Ok(AttemptState::Failed),
            "UNKNOWN" => Ok(AttemptState::Unknown),
            other => Err(format!("unknown attempt state {}", other)),
        }
    }
}

/// What the gateway eventually said about an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResolution {
    Completed { transaction_id: String },
    Failed { reason: String },
    Unknown,
}

impl AttemptResolution {
    pub fn state(&self) -> AttemptState {
        match self {
            AttemptResolution::Completed { .. } => AttemptState::Completed,
            AttemptResolution::Failed { .. } => AttemptState::Failed,
            AttemptResolution::Unknown => AttemptState::Unknown,
        }
    }
}

/// One submission of a charge for a booking. Retries of the same attempt
/// share its idempotency key; a new attempt gets the next sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentAttempt {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub sequence: u32,
    pub idempotency_key: IdempotencyKey,
    pub amount_cents: i64,
    pub currency: String,
    pub method: PaymentMethod,
    pub state: AttemptState,
    pub submitted_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub transaction_id: Option<String>,
    pub failure_reason: Option<String>,
}

impl PaymentAttempt {
    pub fn submitted(
        booking_id: Uuid,
        sequence: u32,
        amount_cents: i64,
        currency: &str,
        method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id,
            sequence,
            idempotency_key: IdempotencyKey::for_attempt(booking_id, sequence),
            amount_cents,
            currency: currency.to_string(),
            method,
            state: AttemptState::Submitted,
            submitted_at: now,
            resolved_at: None,
            transaction_id: None,
            failure_reason: None,
        }
    }

    pub(crate) fn resolved(&self, resolution: &AttemptResolution, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.state = resolution.state();
        match resolution {
            AttemptResolution::Completed { transaction_id } => {
                next.transaction_id = Some(transaction_id.clone());
                next.resolved_at = Some(now);
            }
            AttemptResolution::Failed { reason } => {
                next.failure_reason = Some(reason.clone());
                next.resolved_at = Some(now);
            }
            AttemptResolution::Unknown => {}
        }
        next
    }
}
