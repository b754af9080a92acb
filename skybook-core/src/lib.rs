pub mod catalog;
pub mod clock;
pub mod events;
pub mod identity;
pub mod payment;

pub use catalog::{Flight, FlightCatalog, StaticCatalog};
pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{EventSink, NoopEventSink, RecordingEventSink};
pub use identity::{Principal, Role};
pub use payment::{
    ChargeOutcome, ChargeRequest, ChargeStatus, GatewayError, IdempotencyKey, MockPaymentGateway,
    PaymentDetails, PaymentGateway, PaymentMethod,
};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
    #[error("Identity verification failed: {0}")]
    IdentityError(String),
    #[error("Event publishing failed: {0}")]
    PublishError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
