//! Supervision Value Objects

mod failure_mode;
mod halt_reason;

pub use failure_mode::FailureMode;
pub use halt_reason::HaltReason;
