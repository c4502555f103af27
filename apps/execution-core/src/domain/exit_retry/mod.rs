//! Exit Retry Bounded Context
//!
//! Work items that keep resubmitting a trade's exit with backoff until it
//! fills or is dead-lettered.

pub mod aggregate;
pub mod errors;
pub mod repository;
pub mod value_objects;

pub use aggregate::ExitRetryRequest;
pub use errors::ExitRetryRequestError;
pub use repository::{EnqueueOutcome, ExitRetryRepository};
pub use value_objects::{AttemptOutcome, BackoffPolicy, RetryDecision, decide};
