//! Exit Retry Domain Errors

use thiserror::Error;

/// Errors raised by the exit retry request aggregate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExitRetryRequestError {
    /// The request is resolved or dead-lettered and takes no more attempts.
    #[error("Exit retry {id} is already {outcome}")]
    Settled {
        /// Request id.
        id: String,
        /// `resolved` or `dead_lettered`.
        outcome: &'static str,
    },
}
