//! Exit Retry Aggregates

mod exit_retry_request;

pub use exit_retry_request::ExitRetryRequest;
