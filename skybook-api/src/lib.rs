use axum::{http::Method, middleware::from_fn_with_state, routing::get, Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod auth;
pub mod bookings;
pub mod error;
pub mod flights;
pub mod metrics;
pub mod middleware;
pub mod state;
pub mod worker;

pub use error::AppError;
pub use state::{AppState, AuthConfig, Resiliency};

pub fn app(state: AppState) -> Router {
    // CORS Middleware
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let customer = Router::new()
        .merge(bookings::routes())
        .merge(flights::routes())
        .route_layer(from_fn_with_state(state.clone(), middleware::circuit_breaker_middleware))
        .route_layer(from_fn_with_state(state.clone(), middleware::customer_auth_middleware));

    let admin = admin::routes().route_layer(from_fn_with_state(state.clone(), middleware::admin_auth_middleware));

    Router::new()
        .merge(auth::routes())
        .merge(customer)
        .merge(admin)
        .route("/health", get(|| async { Json(json!({ "status": "ok" })) }))
        .route("/metrics", get(metrics::metrics_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
