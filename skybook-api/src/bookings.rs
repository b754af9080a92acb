use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use skybook_core::{PaymentDetails, Principal};
use skybook_ledger::Booking;
use skybook_saga::{BookingStatus, PayOutcome, SagaError};
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    pub flight_id: Uuid,
    pub seat_number: String,
}

#[derive(Debug, Serialize)]
pub struct PayResponse {
    /// CONFIRMED, PENDING or REJECTED
    pub status: &'static str,
    pub booking: Booking,
    pub payment_attempt_id: Option<Uuid>,
    pub reason: Option<String>,
}

impl PayResponse {
    fn from_outcome(outcome: PayOutcome) -> (StatusCode, Self) {
        match outcome {
            PayOutcome::Confirmed(booking) => (
                StatusCode::OK,
                Self { status: "CONFIRMED", booking, payment_attempt_id: None, reason: None },
            ),
            PayOutcome::Pending { booking, attempt_id } => (
                StatusCode::ACCEPTED,
                Self { status: "PENDING", booking, payment_attempt_id: Some(attempt_id), reason: None },
            ),
            PayOutcome::Rejected { booking, attempt_id, reason } => (
                StatusCode::PAYMENT_REQUIRED,
                Self { status: "REJECTED", booking, payment_attempt_id: Some(attempt_id), reason: Some(reason) },
            ),
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(reserve).get(list_bookings))
        .route("/v1/bookings/{id}", get(booking_status))
        .route("/v1/bookings/{id}/pay", post(pay))
        .route("/v1/bookings/{id}/cancel", post(cancel))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/bookings
/// Hold a seat for the caller. 409 SEAT_TAKEN if someone else has it.
async fn reserve(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<ReserveRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    match state.coordinator.reserve(req.flight_id, &req.seat_number, &principal).await {
        Ok(booking) => {
            state.metrics.reservation("held");
            Ok((StatusCode::CREATED, Json(booking)))
        }
        Err(e) => {
            let outcome = match e {
                SagaError::SeatTaken { .. } => "seat_taken",
                _ => "rejected",
            };
            state.metrics.reservation(outcome);
            Err(e.into())
        }
    }
}

/// GET /v1/bookings
async fn list_bookings(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.coordinator.bookings_for(&principal).await?))
}

/// GET /v1/bookings/{id}
async fn booking_status(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingStatus>, AppError> {
    Ok(Json(state.coordinator.status(booking_id, &principal).await?))
}

/// POST /v1/bookings/{id}/pay
async fn pay(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(booking_id): Path<Uuid>,
    Json(details): Json<PaymentDetails>,
) -> Result<Response, AppError> {
    match state.coordinator.pay(booking_id, &details, &principal).await {
        Ok(outcome) => {
            let (status, body) = PayResponse::from_outcome(outcome);
            state.metrics.payment(&body.status.to_ascii_lowercase());
            Ok((status, Json(body)).into_response())
        }
        Err(e) => {
            let outcome = match e {
                SagaError::HoldExpired(_) => "expired",
                SagaError::PaymentInFlight(_) => "in_flight",
                _ => "error",
            };
            state.metrics.payment(outcome);
            Err(e.into())
        }
    }
}

/// POST /v1/bookings/{id}/cancel
async fn cancel(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.coordinator.cancel(booking_id, &principal).await?))
}
