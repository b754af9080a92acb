use std::sync::Arc;
use std::time::Duration;

use skybook_saga::SagaCoordinator;
use skybook_store::BroadcastEventSink;

use crate::metrics::Metrics;
use crate::middleware::resiliency::CircuitBreaker;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

pub struct Resiliency {
    pub payment_cb: CircuitBreaker,
}

impl Default for Resiliency {
    fn default() -> Self {
        Self {
            payment_cb: CircuitBreaker::new("payment-gateway", 5, Duration::from_secs(30)),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<SagaCoordinator>,
    /// Feeds the per-flight SSE streams.
    pub seat_events: BroadcastEventSink,
    pub metrics: Arc<Metrics>,
    pub resiliency: Arc<Resiliency>,
    pub auth: AuthConfig,
}
