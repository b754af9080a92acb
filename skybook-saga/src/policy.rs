use rand::Rng;
use std::time::Duration;

/// Timing knobs of the saga: hold length, how hard to push an unresponsive
/// gateway, and how long an unresolved charge may linger before someone is told.
#[derive(Debug, Clone)]
pub struct SagaPolicy {
    pub hold_ttl: chrono::Duration,
    pub gateway_timeout: Duration,
    /// Extra submissions of the same attempt after a transport failure.
    pub submit_retries: u32,
    pub retry_backoff: Duration,
    pub max_backoff: Duration,
    /// Status queries made inline by `pay` before answering Pending.
    pub poll_attempts: u32,
    pub poll_interval: Duration,
    pub unresolved_alert_after: chrono::Duration,
    pub sweep_interval: Duration,
}

impl Default for SagaPolicy {
    fn default() -> Self {
        Self {
            hold_ttl: chrono::Duration::minutes(10),
            gateway_timeout: Duration::from_secs(10),
            submit_retries: 2,
            retry_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            poll_attempts: 3,
            poll_interval: Duration::from_millis(500),
            unresolved_alert_after: chrono::Duration::minutes(15),
            sweep_interval: Duration::from_secs(5),
        }
    }
}

impl SagaPolicy {
    /// Exponential backoff for the given retry (0-based), capped, with jitter
    /// in [0.5, 1.0] so retries from many bookings spread out.
    pub fn backoff(&self, retry: u32) -> Duration {
        let base = self.retry_backoff.as_secs_f64() * 2f64.powi(retry.min(16) as i32);
        let capped = base.min(self.max_backoff.as_secs_f64());
        let jitter = rand::thread_rng().gen_range(0.5..=1.0);
        Duration::from_secs_f64(capped * jitter)
    }

    /// Longest one `submit` with all of its retries can stay in the air.
    pub fn submit_window(&self) -> Duration {
        self.gateway_timeout * (self.submit_retries + 1) + self.max_backoff * self.submit_retries
    }

    /// Policy for tests: short hold, no real waiting.
    pub fn immediate(hold_ttl: chrono::Duration) -> Self {
        Self {
            hold_ttl,
            gateway_timeout: Duration::from_millis(500),
            submit_retries: 2,
            retry_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            poll_attempts: 3,
            poll_interval: Duration::from_millis(1),
            unresolved_alert_after: chrono::Duration::minutes(15),
            sweep_interval: Duration::from_millis(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_capped_and_jittered() {
        let policy = SagaPolicy::default();
        for retry in 0..10 {
            let delay = policy.backoff(retry);
            assert!(delay <= policy.max_backoff);
            assert!(delay >= policy.retry_backoff / 2);
        }
    }

    #[test]
    fn test_submit_window_covers_every_retry() {
        let policy = SagaPolicy::default();
        // 3 submissions of 10s plus 2 backoffs capped at 2s.
        assert_eq!(policy.submit_window(), Duration::from_secs(34));
    }
}
