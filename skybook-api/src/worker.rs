use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use skybook_saga::{ExpirySweeper, SagaCoordinator, SweepReport};

use crate::metrics::Metrics;

fn record(metrics: &Metrics, report: &SweepReport) {
    metrics.sweep("expired", report.expired);
    metrics.sweep("confirmed_late", report.confirmed_late);
    metrics.sweep("refunded", report.refunded);
    metrics.sweep("still_pending", report.still_pending);
    metrics.sweep("orphan_released", report.orphans_released);
    metrics.sweep("seat_repaired", report.seats_repaired);
    metrics.sweep("error", report.errors);
}

/// Start the expiry sweeper in the background. Flip the returned sender to
/// `true` to stop it.
pub fn start_expiry_worker(
    coordinator: Arc<SagaCoordinator>,
    metrics: Arc<Metrics>,
) -> (watch::Sender<bool>, JoinHandle<()>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = Arc::new(ExpirySweeper::new(coordinator));

    info!("Expiry worker starting");
    let handle = tokio::spawn(sweeper.run_with(shutdown_rx, move |report| record(&metrics, report)));

    (shutdown_tx, handle)
}
