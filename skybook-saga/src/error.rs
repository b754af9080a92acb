use skybook_core::CoreError;
use skybook_inventory::InventoryError;
use skybook_ledger::{BookingState, LedgerError};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum SagaError {
    #[error("Seat {seat} on flight {flight_id} is already taken, please pick another seat")]
    SeatTaken { flight_id: Uuid, seat: String },

    #[error("Flight not found: {0}")]
    FlightNotFound(Uuid),

    #[error("Seat {seat} does not exist on flight {flight_id}")]
    SeatNotFound { flight_id: Uuid, seat: String },

    #[error("Booking not found: {0}")]
    BookingNotFound(Uuid),

    #[error("Not allowed to act on booking {0}")]
    Forbidden(Uuid),

    #[error("Hold on booking {0} expired, seat released, please reselect")]
    HoldExpired(Uuid),

    #[error("Booking {booking_id} is {state:?}")]
    InvalidState { booking_id: Uuid, state: BookingState },

    #[error("Amount mismatch: expected {expected_cents} {currency}, got {actual_cents} {actual_currency}")]
    AmountMismatch {
        expected_cents: i64,
        currency: String,
        actual_cents: i64,
        actual_currency: String,
    },

    #[error("Payment for booking {0} is still being resolved")]
    PaymentInFlight(Uuid),

    #[error("Cannot shrink flight {flight_id} to {requested} seats: seat {seat} is claimed")]
    CapacityBelowClaims {
        flight_id: Uuid,
        requested: u32,
        seat: String,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CoreError),

    #[error(transparent)]
    Ledger(LedgerError),
}

pub type SagaResult<T> = Result<T, SagaError>;

impl SagaError {
    /// The caller can fix this by trying again (another seat, another card, later).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SagaError::SeatTaken { .. } | SagaError::PaymentInFlight(_) | SagaError::HoldExpired(_)
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            SagaError::SeatTaken { .. } => "SEAT_TAKEN",
            SagaError::FlightNotFound(_) => "FLIGHT_NOT_FOUND",
            SagaError::SeatNotFound { .. } => "SEAT_NOT_FOUND",
            SagaError::BookingNotFound(_) => "BOOKING_NOT_FOUND",
            SagaError::Forbidden(_) => "FORBIDDEN",
            SagaError::HoldExpired(_) => "HOLD_EXPIRED",
            SagaError::InvalidState { .. } => "INVALID_BOOKING_STATE",
            SagaError::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            SagaError::PaymentInFlight(_) => "PAYMENT_IN_FLIGHT",
            SagaError::CapacityBelowClaims { .. } => "CAPACITY_BELOW_CLAIMS",
            SagaError::InvalidRequest(_) => "INVALID_REQUEST",
            SagaError::InvariantViolation(_) => "INVARIANT_VIOLATION",
            SagaError::Catalog(_) | SagaError::Ledger(_) => "INTERNAL",
        }
    }
}

impl From<InventoryError> for SagaError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::Conflict { flight_id, seat } => SagaError::SeatTaken { flight_id, seat },
            InventoryError::FlightNotFound(id) => SagaError::FlightNotFound(id),
            InventoryError::SeatNotFound { flight_id, seat } => SagaError::SeatNotFound { flight_id, seat },
            InventoryError::CapacityBelowClaims { flight_id, requested, seat } => {
                SagaError::CapacityBelowClaims { flight_id, requested, seat }
            }
            InventoryError::InvalidLayout(msg) => SagaError::InvalidRequest(msg),
            other => SagaError::Ledger(LedgerError::Inventory(other)),
        }
    }
}

impl From<LedgerError> for SagaError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::SeatTaken { flight_id, seat } => SagaError::SeatTaken { flight_id, seat },
            LedgerError::BookingNotFound(id) => SagaError::BookingNotFound(id),
            LedgerError::NotHeld { booking_id, state } => SagaError::InvalidState { booking_id, state },
            LedgerError::AttemptInProgress(id) => SagaError::PaymentInFlight(id),
            LedgerError::InvariantViolation(msg) => SagaError::InvariantViolation(msg),
            LedgerError::Inventory(inner) => inner.into(),
            other => SagaError::Ledger(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let taken = SagaError::from(LedgerError::SeatTaken {
            flight_id: Uuid::nil(),
            seat: "12A".to_string(),
        });
        assert!(taken.is_retryable());
        assert_eq!(taken.code(), "SEAT_TAKEN");

        let broken = SagaError::from(LedgerError::InvariantViolation("two confirmations".to_string()));
        assert!(!broken.is_retryable());
        assert_eq!(broken.code(), "INVARIANT_VIOLATION");

        let missing = SagaError::from(LedgerError::Inventory(InventoryError::FlightNotFound(Uuid::nil())));
        assert_eq!(missing.code(), "FLIGHT_NOT_FOUND");
    }
}
