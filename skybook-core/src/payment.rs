use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use skybook_shared::Masked;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Key the gateway deduplicates charges on. One key per payment attempt:
/// `{booking_id}:{sequence}`. Retries of the same attempt reuse it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn for_attempt(booking_id: Uuid, sequence: u32) -> Self {
        Self(format!("{}:{}", booking_id, sequence))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for IdempotencyKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Card,
    Paypal,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "CARD",
            PaymentMethod::Paypal => "PAYPAL",
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CARD" => Ok(PaymentMethod::Card),
            "PAYPAL" => Ok(PaymentMethod::Paypal),
            other => Err(format!("unknown payment method {}", other)),
        }
    }
}

/// What the client submits to pay for a hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub method: PaymentMethod,
    pub amount_cents: i64,
    pub currency: String,
    /// Tokenized card / wallet reference from the client-side SDK.
    pub token: Masked<String>,
}

#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub booking_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub method: PaymentMethod,
    pub token: Masked<String>,
    pub idempotency_key: IdempotencyKey,
}

/// Answer to a submission. `Unknown` means the gateway may or may not have
/// charged; it must be resolved through `query_status`, never assumed failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    Completed { transaction_id: String },
    Failed { reason: String },
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeStatus {
    Completed { transaction_id: String },
    Failed { reason: String },
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Transport-level failure: the request may or may not have reached the processor.
    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),
    /// The processor has never seen this key, so nothing was charged under it.
    #[error("Payment gateway has no record of {0}")]
    UnknownKey(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Submit a charge. Submitting the same idempotency key twice must not charge twice.
    async fn submit(&self, request: &ChargeRequest) -> Result<ChargeOutcome, GatewayError>;

    /// Ask for the eventual outcome of a previously submitted key.
    async fn query_status(&self, key: &IdempotencyKey) -> Result<ChargeStatus, GatewayError>;
}

/// Card token that is always declined.
pub const TOKEN_DECLINE: &str = "tok_decline";
/// Card token whose submission answers `Unknown` and later settles as completed.
pub const TOKEN_AMBIGUOUS: &str = "tok_ambiguous";
/// Card token whose submission answers `Unknown` and later settles as declined.
pub const TOKEN_AMBIGUOUS_DECLINE: &str = "tok_ambiguous_decline";
/// Card token for which the gateway is unreachable.
pub const TOKEN_UNAVAILABLE: &str = "tok_unavailable";

#[derive(Debug, Clone)]
struct MockCharge {
    amount_cents: i64,
    status: ChargeStatus,
    settles_to: ChargeStatus,
    polls_remaining: u32,
}

/// In-process gateway for development and tests. Idempotent per key and
/// scripted by card token.
pub struct MockPaymentGateway {
    charges: Mutex<HashMap<IdempotencyKey, MockCharge>>,
    submissions: AtomicUsize,
    settle_after_polls: u32,
    latency: Option<Duration>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self {
            charges: Mutex::new(HashMap::new()),
            submissions: AtomicUsize::new(0),
            settle_after_polls: 1,
            latency: None,
        }
    }

    /// Ambiguous charges answer `Pending` this many times before settling.
    pub fn with_settle_after(mut self, polls: u32) -> Self {
        self.settle_after_polls = polls;
        self
    }

    /// Simulated network delay applied to every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Force the eventual outcome of a pending charge (processor webhook in real life).
    pub async fn settle(&self, key: &IdempotencyKey, status: ChargeStatus) {
        if let Some(charge) = self.charges.lock().await.get_mut(key) {
            charge.status = status.clone();
            charge.settles_to = status;
            charge.polls_remaining = 0;
        }
    }

    pub async fn status_of(&self, key: &IdempotencyKey) -> Option<ChargeStatus> {
        self.charges.lock().await.get(key).map(|c| c.status.clone())
    }

    /// Number of distinct keys that ended up charged.
    pub async fn completed_charges(&self) -> usize {
        self.charges
            .lock()
            .await
            .values()
            .filter(|c| matches!(c.status, ChargeStatus::Completed { .. }))
            .count()
    }

    /// Total amount captured across all keys.
    pub async fn captured_cents(&self) -> i64 {
        self.charges
            .lock()
            .await
            .values()
            .filter(|c| matches!(c.status, ChargeStatus::Completed { .. }))
            .map(|c| c.amount_cents)
            .sum()
    }

    /// Raw number of `submit` calls, retries included.
    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl Default for MockPaymentGateway {
    fn default() -> Self {
        Self::new()
    }
}

fn outcome_of(status: &ChargeStatus) -> ChargeOutcome {
    match status {
        ChargeStatus::Completed { transaction_id } => ChargeOutcome::Completed {
            transaction_id: transaction_id.clone(),
        },
        ChargeStatus::Failed { reason } => ChargeOutcome::Failed { reason: reason.clone() },
        ChargeStatus::Pending => ChargeOutcome::Unknown,
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn submit(&self, request: &ChargeRequest) -> Result<ChargeOutcome, GatewayError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        let token = request.token.expose().as_str();
        if token == TOKEN_UNAVAILABLE {
            return Err(GatewayError::Unavailable("connection reset by peer".to_string()));
        }

        let mut charges = self.charges.lock().await;
        if let Some(existing) = charges.get(&request.idempotency_key) {
            tracing::debug!(key = %request.idempotency_key, "Mock gateway replaying charge");
            return Ok(outcome_of(&existing.status));
        }

        let completed = ChargeStatus::Completed {
            transaction_id: format!("mock_txn_{}", request.idempotency_key),
        };
        let declined = ChargeStatus::Failed {
            reason: "card declined".to_string(),
        };

        let charge = match token {
            TOKEN_DECLINE => MockCharge {
                amount_cents: request.amount_cents,
                status: declined.clone(),
                settles_to: declined,
                polls_remaining: 0,
            },
            TOKEN_AMBIGUOUS => MockCharge {
                amount_cents: request.amount_cents,
                status: ChargeStatus::Pending,
                settles_to: completed,
                polls_remaining: self.settle_after_polls,
            },
            TOKEN_AMBIGUOUS_DECLINE => MockCharge {
                amount_cents: request.amount_cents,
                status: ChargeStatus::Pending,
                settles_to: declined,
                polls_remaining: self.settle_after_polls,
            },
            _ => MockCharge {
                amount_cents: request.amount_cents,
                status: completed.clone(),
                settles_to: completed,
                polls_remaining: 0,
            },
        };

        let outcome = outcome_of(&charge.status);
        tracing::info!(
            booking_id = %request.booking_id,
            key = %request.idempotency_key,
            amount = request.amount_cents,
            "Mock gateway accepted charge: {:?}",
            outcome
        );
        charges.insert(request.idempotency_key.clone(), charge);
        Ok(outcome)
    }

    async fn query_status(&self, key: &IdempotencyKey) -> Result<ChargeStatus, GatewayError> {
        self.simulate_latency().await;

        let mut charges = self.charges.lock().await;
        let charge = charges
            .get_mut(key)
            .ok_or_else(|| GatewayError::UnknownKey(key.to_string()))?;

        if charge.status == ChargeStatus::Pending {
            if charge.polls_remaining == 0 {
                charge.status = charge.settles_to.clone();
            } else {
                charge.polls_remaining -= 1;
            }
        }

        Ok(charge.status.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(token: &str, sequence: u32) -> ChargeRequest {
        let booking_id = Uuid::new_v4();
        ChargeRequest {
            booking_id,
            amount_cents: 12_500,
            currency: "USD".to_string(),
            method: PaymentMethod::Card,
            token: Masked::new(token.to_string()),
            idempotency_key: IdempotencyKey::for_attempt(booking_id, sequence),
        }
    }

    #[test]
    fn test_idempotency_key_format() {
        let booking_id = Uuid::nil();
        let key = IdempotencyKey::for_attempt(booking_id, 3);
        assert_eq!(key.as_str(), "00000000-0000-0000-0000-000000000000:3");
    }

    #[tokio::test]
    async fn test_resubmission_does_not_charge_twice() {
        let gateway = MockPaymentGateway::new();
        let req = request("tok_visa", 1);

        let first = gateway.submit(&req).await.unwrap();
        let second = gateway.submit(&req).await.unwrap();

        assert_eq!(first, second);
        assert!(matches!(first, ChargeOutcome::Completed { .. }));
        assert_eq!(gateway.submissions(), 2);
        assert_eq!(gateway.completed_charges().await, 1);
        assert_eq!(gateway.captured_cents().await, 12_500);
    }

    #[tokio::test]
    async fn test_ambiguous_charge_settles_after_polls() {
        let gateway = MockPaymentGateway::new().with_settle_after(2);
        let req = request(TOKEN_AMBIGUOUS, 1);

        assert_eq!(gateway.submit(&req).await.unwrap(), ChargeOutcome::Unknown);
        let key = &req.idempotency_key;
        assert_eq!(gateway.query_status(key).await.unwrap(), ChargeStatus::Pending);
        assert_eq!(gateway.query_status(key).await.unwrap(), ChargeStatus::Pending);
        assert!(matches!(
            gateway.query_status(key).await.unwrap(),
            ChargeStatus::Completed { .. }
        ));
    }

    #[tokio::test]
    async fn test_decline_and_unknown_key() {
        let gateway = MockPaymentGateway::new();
        let req = request(TOKEN_DECLINE, 1);

        assert!(matches!(gateway.submit(&req).await.unwrap(), ChargeOutcome::Failed { .. }));

        let never_sent = IdempotencyKey::for_attempt(Uuid::new_v4(), 1);
        assert!(matches!(
            gateway.query_status(&never_sent).await,
            Err(GatewayError::UnknownKey(_))
        ));
    }

    #[tokio::test]
    async fn test_unavailable_gateway_records_nothing() {
        let gateway = MockPaymentGateway::new();
        let req = request(TOKEN_UNAVAILABLE, 1);

        assert!(matches!(gateway.submit(&req).await, Err(GatewayError::Unavailable(_))));
        assert!(gateway.status_of(&req.idempotency_key).await.is_none());
    }
}
