use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::coordinator::{ExpireOutcome, SagaCoordinator, Settlement};
use crate::error::SagaResult;

/// What one pass of the sweeper did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired: usize,
    pub confirmed_late: usize,
    pub refunded: usize,
    pub still_pending: usize,
    pub orphans_released: usize,
    pub seats_repaired: usize,
    pub errors: usize,
}

impl SweepReport {
    pub fn is_idle(&self) -> bool {
        *self == SweepReport::default()
    }
}

/// Enforces hold deadlines. Holds are persisted with their deadline, so this
/// is correct after restarts and for clients that simply went away.
pub struct ExpirySweeper {
    coordinator: Arc<SagaCoordinator>,
    interval: Duration,
    alerted: Mutex<HashSet<Uuid>>,
}

impl ExpirySweeper {
    pub fn new(coordinator: Arc<SagaCoordinator>) -> Self {
        let interval = coordinator.policy().sweep_interval;
        Self {
            coordinator,
            interval,
            alerted: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub async fn sweep_once(&self) -> SagaResult<SweepReport> {
        let now = self.coordinator.now();
        let mut report = SweepReport::default();

        for booking in self.coordinator.ledger().held_past(now).await? {
            // A payment that is still in the air decides first.
            let settlement = match self.coordinator.resolve_pending(booking.id).await {
                Ok(settlement) => settlement,
                Err(e) => {
                    error!(booking_id = %booking.id, "Failed to resolve pending payment: {}", e);
                    report.errors += 1;
                    continue;
                }
            };

            match settlement {
                Settlement::Confirmed(_) => {
                    info!(booking_id = %booking.id, "Late payment confirmed booking past its deadline");
                    report.confirmed_late += 1;
                    continue;
                }
                Settlement::Refunded { .. } => {
                    report.refunded += 1;
                    continue;
                }
                Settlement::Pending(attempt) => {
                    report.still_pending += 1;
                    let waited = now - attempt.submitted_at;
                    if waited > self.coordinator.policy().unresolved_alert_after
                        && self.alerted.lock().await.insert(attempt.id)
                    {
                        self.coordinator.alert_unresolved(&attempt, now).await;
                    }
                    continue;
                }
                Settlement::NothingOutstanding | Settlement::Declined { .. } => {}
            }

            match self.coordinator.expire(booking.id).await {
                Ok(ExpireOutcome::Expired(_)) => report.expired += 1,
                Ok(ExpireOutcome::AlreadyResolved(b)) => {
                    debug!(booking_id = %b.id, state = b.state.as_str(), "Booking resolved before expiry");
                }
                Ok(ExpireOutcome::PaymentPending(_)) => report.still_pending += 1,
                Err(e) => {
                    error!(booking_id = %booking.id, "Failed to expire hold: {}", e);
                    report.errors += 1;
                }
            }
        }

        match self.coordinator.reconcile_orphans(now).await {
            Ok(orphans) => {
                report.orphans_released = orphans.released;
                report.seats_repaired = orphans.repaired;
            }
            Err(e) => {
                error!("Seat reconciliation failed: {}", e);
                report.errors += 1;
            }
        }

        if !report.is_idle() {
            info!(?report, "Sweep finished");
        }
        Ok(report)
    }

    /// Sweep on every tick until `shutdown` flips to true.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        self.run_with(shutdown, |_| {}).await
    }

    /// Like `run`, handing each finished report to `on_report`.
    pub async fn run_with<F>(self: Arc<Self>, mut shutdown: watch::Receiver<bool>, mut on_report: F)
    where
        F: FnMut(&SweepReport) + Send,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval = ?self.interval, "Expiry sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep_once().await {
                        Ok(report) => on_report(&report),
                        Err(e) => warn!("Sweep failed: {}", e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Expiry sweeper stopped");
    }
}
