use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use skybook_core::{Principal, Role};

use crate::state::AppState;

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    /// "CUSTOMER" or "ADMIN"
    pub role: String,
    pub exp: usize,
}

impl Claims {
    pub fn principal(&self) -> Option<Principal> {
        match self.role.as_str() {
            "CUSTOMER" => Some(Principal::customer(self.sub.clone())),
            "ADMIN" => Some(Principal::admin(self.sub.clone())),
            _ => None,
        }
    }
}

fn authenticate(state: &AppState, req: &Request) -> Result<Principal, StatusCode> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth_header.strip_prefix("Bearer ").ok_or(StatusCode::UNAUTHORIZED)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    token_data.claims.principal().ok_or(StatusCode::FORBIDDEN)
}

// ============================================================================
// Customer Authentication Middleware
// ============================================================================

/// Any valid token. Admins pass too; ownership checks happen in the saga.
pub async fn customer_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let principal = authenticate(&state, &req)?;
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

// ============================================================================
// Admin Authentication Middleware
// ============================================================================

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let principal = authenticate(&state, &req)?;
    if principal.role != Role::Admin {
        return Err(StatusCode::FORBIDDEN);
    }
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_role_has_no_principal() {
        let claims = Claims { sub: "guest-1".to_string(), role: "GUEST".to_string(), exp: 0 };
        assert!(claims.principal().is_none());

        let admin = Claims { sub: "ops".to_string(), role: "ADMIN".to_string(), exp: 0 };
        assert!(admin.principal().unwrap().is_admin());
    }
}
