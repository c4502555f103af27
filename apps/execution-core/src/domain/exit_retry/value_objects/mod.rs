//! Exit Retry Value Objects

mod attempt_outcome;
mod backoff;

pub use attempt_outcome::{AttemptOutcome, RetryDecision, decide};
pub use backoff::BackoffPolicy;
