use axum::{extract::State, routing::post, Json, Router};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use uuid::Uuid;

use crate::{error::AppError, middleware::auth::Claims, state::AppState};

#[derive(Debug, Serialize)]
struct AuthResponse {
    token: String,
    sub: String,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/auth/guest", post(login_guest))
}

/// Sign a token for `sub`. Role is "CUSTOMER" or "ADMIN".
pub fn issue_token(secret: &str, sub: &str, role: &str, expiration_seconds: u64) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: sub.to_string(),
        role: role.to_string(),
        exp: (Utc::now() + Duration::seconds(expiration_seconds as i64)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}

/// POST /v1/auth/guest
/// Development login: a fresh customer identity per call.
async fn login_guest(State(state): State<AppState>) -> Result<Json<AuthResponse>, AppError> {
    let sub = format!("guest-{}", Uuid::new_v4());
    let token = issue_token(&state.auth.secret, &sub, "CUSTOMER", state.auth.expiration)
        .map_err(|e| AppError::InternalServerError(format!("Token encoding failed: {}", e)))?;

    Ok(Json(AuthResponse { token, sub }))
}
