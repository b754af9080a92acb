pub mod auth;
pub mod resiliency;

pub use auth::{admin_auth_middleware, customer_auth_middleware, Claims};
pub use resiliency::{circuit_breaker_middleware, CircuitBreaker};
