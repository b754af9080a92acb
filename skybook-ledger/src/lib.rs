pub mod ledger;
pub mod models;
pub mod store;

pub use ledger::{
    CompensateOutcome, ConfirmOutcome, LedgerError, LedgerResult, Reconciliation, ReservationLedger,
};
pub use models::{
    AttemptResolution, AttemptState, Booking, BookingState, CompensationReason, PaymentAttempt,
};
pub use store::{BookingStore, MemoryBookingStore, StorageError, StorageResult};
