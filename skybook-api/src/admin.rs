use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::Deserialize;
use skybook_core::{Flight, Principal};
use skybook_ledger::{Booking, PaymentAttempt};
use tracing::info;
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct CapacityRequest {
    pub total_seats: u32,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/bookings", get(list_bookings))
        .route("/v1/admin/bookings/{id}/payments", get(list_payments))
        .route("/v1/admin/bookings/{id}/cancel", post(cancel_booking))
        .route("/v1/admin/flights/{id}/capacity", put(update_capacity))
}

/// GET /v1/admin/bookings
async fn list_bookings(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.coordinator.all_bookings(&principal).await?))
}

/// GET /v1/admin/bookings/{id}/payments
async fn list_payments(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Vec<PaymentAttempt>>, AppError> {
    Ok(Json(state.coordinator.attempts(booking_id, &principal).await?))
}

/// POST /v1/admin/bookings/{id}/cancel
async fn cancel_booking(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    let booking = state.coordinator.cancel(booking_id, &principal).await?;
    info!(%booking_id, admin = %principal.id, "Booking cancelled by admin");
    Ok(Json(booking))
}

/// PUT /v1/admin/flights/{id}/capacity
/// Refused with 409 when a held or confirmed seat would fall off the end.
async fn update_capacity(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(flight_id): Path<Uuid>,
    Json(req): Json<CapacityRequest>,
) -> Result<Json<Flight>, AppError> {
    if req.total_seats == 0 {
        return Err(AppError::ValidationError("total_seats must be positive".to_string()));
    }
    Ok(Json(state.coordinator.update_capacity(flight_id, req.total_seats, &principal).await?))
}
