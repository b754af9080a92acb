pub mod coordinator;
pub mod error;
pub mod policy;
pub mod sweeper;

pub use coordinator::{BookingStatus, ExpireOutcome, OrphanReport, PayOutcome, SagaCoordinator, Settlement};
pub use error::{SagaError, SagaResult};
pub use policy::SagaPolicy;
pub use sweeper::{ExpirySweeper, SweepReport};
