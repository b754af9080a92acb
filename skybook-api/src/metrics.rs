use axum::{extract::State, http::StatusCode, response::IntoResponse};
use prometheus::{opts, IntCounterVec, Registry, TextEncoder};

use crate::state::AppState;

pub struct Metrics {
    registry: Registry,
    pub reservations: IntCounterVec,
    pub payments: IntCounterVec,
    pub sweeps: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let reservations = IntCounterVec::new(
            opts!("skybook_reservations_total", "Seat reservation attempts by outcome"),
            &["outcome"],
        )?;
        let payments = IntCounterVec::new(
            opts!("skybook_payments_total", "Payment submissions by outcome"),
            &["outcome"],
        )?;
        let sweeps = IntCounterVec::new(
            opts!("skybook_sweeps_total", "Expiry sweeper work by result"),
            &["result"],
        )?;

        registry.register(Box::new(reservations.clone()))?;
        registry.register(Box::new(payments.clone()))?;
        registry.register(Box::new(sweeps.clone()))?;

        Ok(Self {
            registry,
            reservations,
            payments,
            sweeps,
        })
    }

    pub fn reservation(&self, outcome: &str) {
        self.reservations.with_label_values(&[outcome]).inc();
    }

    pub fn payment(&self, outcome: &str) {
        self.payments.with_label_values(&[outcome]).inc();
    }

    pub fn sweep(&self, result: &str, count: usize) {
        if count > 0 {
            self.sweeps.with_label_values(&[result]).inc_by(count as u64);
        }
    }

    pub fn export(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.export() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_exported() {
        let metrics = Metrics::new().unwrap();
        metrics.reservation("held");
        metrics.reservation("seat_taken");
        metrics.sweep("expired", 2);
        metrics.sweep("refunded", 0);

        let text = metrics.export().unwrap();
        assert!(text.contains("skybook_reservations_total{outcome=\"held\"} 1"));
        assert!(text.contains("skybook_sweeps_total{result=\"expired\"} 2"));
        assert!(!text.contains("result=\"refunded\""));
    }
}
