use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use skybook_saga::SagaError;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    ServiceUnavailable(String),
    Saga(SagaError),
    InternalServerError(String),
    Anyhow(anyhow::Error),
}

fn saga_status(err: &SagaError) -> StatusCode {
    match err {
        SagaError::SeatTaken { .. }
        | SagaError::InvalidState { .. }
        | SagaError::PaymentInFlight(_)
        | SagaError::CapacityBelowClaims { .. } => StatusCode::CONFLICT,
        SagaError::FlightNotFound(_) | SagaError::SeatNotFound { .. } | SagaError::BookingNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        SagaError::Forbidden(_) => StatusCode::FORBIDDEN,
        SagaError::HoldExpired(_) => StatusCode::GONE,
        SagaError::AmountMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        SagaError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        SagaError::InvariantViolation(_) | SagaError::Catalog(_) | SagaError::Ledger(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, error_message, retryable) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", msg, false),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg, false),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg, false),
            AppError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE", msg, true),
            AppError::Saga(err) => {
                let status = saga_status(&err);
                if status.is_server_error() {
                    tracing::error!(code = err.code(), "Internal Server Error: {}", err);
                    (status, err.code(), "Internal Server Error".to_string(), false)
                } else {
                    (status, err.code(), err.to_string(), err.is_retryable())
                }
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", "Internal Server Error".to_string(), false)
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", "Internal Server Error".to_string(), false)
            }
        };

        let body = Json(json!({
            "error": error_message,
            "code": code,
            "retryable": retryable,
        }));

        (status, body).into_response()
    }
}

impl From<SagaError> for AppError {
    fn from(err: SagaError) -> Self {
        Self::Saga(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}
