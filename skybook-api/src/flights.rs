use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use skybook_inventory::OccupiedSeat;
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/flights/{id}/seats", get(occupied_seats))
        .route("/v1/flights/{id}/stream", get(seat_stream))
}

/// GET /v1/flights/{id}/seats
/// Held and confirmed seats; everything else is free.
async fn occupied_seats(
    State(state): State<AppState>,
    Path(flight_id): Path<Uuid>,
) -> Result<Json<Vec<OccupiedSeat>>, AppError> {
    Ok(Json(state.coordinator.occupied_seats(flight_id).await?))
}

/// GET /v1/flights/{id}/stream
async fn seat_stream(
    State(state): State<AppState>,
    Path(flight_id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.seat_events.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(move |result| async move {
        match result {
            Ok(event) if event.flight_id() == Some(flight_id) => {
                Event::default().event(event.name()).json_data(&event).ok().map(Ok)
            }
            Ok(_) => None,
            Err(e) => {
                // Slow subscriber; it will resync from /seats.
                tracing::warn!(%flight_id, "Seat stream lagged: {}", e);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
