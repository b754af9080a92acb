use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skybook_core::Flight;
use std::fmt;
use uuid::Uuid;

/// Opaque proof of which claim a `confirm` or `release` targets. A stale
/// holder (e.g. the sweeper acting on an old read) cannot release a seat that
/// has since been re-claimed by someone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimToken(Uuid);

impl ClaimToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ClaimToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClaimToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// State of one (flight, seat) cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatClaim {
    Free,
    Held {
        booking_id: Uuid,
        token: ClaimToken,
        deadline: DateTime<Utc>,
    },
    Confirmed {
        booking_id: Uuid,
        token: ClaimToken,
    },
}

impl SeatClaim {
    pub fn is_free(&self) -> bool {
        matches!(self, SeatClaim::Free)
    }

    pub fn booking_id(&self) -> Option<Uuid> {
        match self {
            SeatClaim::Free => None,
            SeatClaim::Held { booking_id, .. } | SeatClaim::Confirmed { booking_id, .. } => Some(*booking_id),
        }
    }

    pub fn token(&self) -> Option<ClaimToken> {
        match self {
            SeatClaim::Free => None,
            SeatClaim::Held { token, .. } | SeatClaim::Confirmed { token, .. } => Some(*token),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupiedSeat {
    pub seat_number: String,
    #[serde(flatten)]
    pub claim: SeatClaim,
}

/// A held cell whose deadline has passed, as seen by reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleHold {
    pub flight_id: Uuid,
    pub seat_number: String,
    pub booking_id: Uuid,
    pub token: ClaimToken,
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InventoryError {
    #[error("Seat {seat} on flight {flight_id} is already taken")]
    Conflict { flight_id: Uuid, seat: String },

    #[error("Flight not found: {0}")]
    FlightNotFound(Uuid),

    #[error("Seat {seat} does not exist on flight {flight_id}")]
    SeatNotFound { flight_id: Uuid, seat: String },

    #[error("Seat {seat} on flight {flight_id} is not held under the presented claim")]
    ClaimMismatch { flight_id: Uuid, seat: String },

    #[error("Cannot resize flight {flight_id} to {requested} seats: seat {seat} is claimed")]
    CapacityBelowClaims {
        flight_id: Uuid,
        requested: u32,
        seat: String,
    },

    #[error("Invalid seat layout: {0}")]
    InvalidLayout(String),

    #[error("Inventory backend error: {0}")]
    Backend(String),
}

pub type InventoryResult<T> = Result<T, InventoryError>;

/// Single source of truth for "is seat S on flight F claimed". Every mutation
/// is an atomic compare-and-set on one (flight, seat) cell; no operation holds
/// anything across calls.
#[async_trait]
pub trait SeatInventory: Send + Sync {
    /// Register a flight's seat map. Idempotent; a different capacity resizes.
    async fn provision(&self, flight: &Flight) -> InventoryResult<()>;

    async fn resize(&self, flight_id: Uuid, total_seats: u32) -> InventoryResult<()>;

    /// Free → Held. Exactly one of several racing callers wins.
    async fn claim(
        &self,
        flight_id: Uuid,
        seat: &str,
        booking_id: Uuid,
        deadline: DateTime<Utc>,
    ) -> InventoryResult<ClaimToken>;

    /// Held(token) → Confirmed(token). Already Confirmed under the same token is ok.
    async fn confirm(&self, flight_id: Uuid, seat: &str, token: ClaimToken) -> InventoryResult<()>;

    /// Held(token) | Confirmed(token) → Free.
    async fn release(&self, flight_id: Uuid, seat: &str, token: ClaimToken) -> InventoryResult<()>;

    async fn claim_state(&self, flight_id: Uuid, seat: &str) -> InventoryResult<SeatClaim>;

    async fn occupied(&self, flight_id: Uuid) -> InventoryResult<Vec<OccupiedSeat>>;

    async fn held_before(&self, cutoff: DateTime<Utc>) -> InventoryResult<Vec<StaleHold>>;
}
