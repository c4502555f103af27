//! Observability module for metrics and logging.
//!
//! This module provides instrumentation for the execution core:
//! Prometheus metrics export and structured `tracing` logs.

mod logging;
mod metrics;

pub use logging::{DEFAULT_FILTER, LoggingConfig, LoggingError, env_filter, init_logging};
pub use metrics::{
    MetricsConfig, MetricsError, init_metrics, record_broker_failure, record_dead_letter,
    record_emergency_flatten, record_exit_attempt, record_halt, record_order_placed,
    record_order_polls, record_order_rejection, record_reconciliation_mismatch,
    record_stop_loss_failure, set_emergency_mode, set_safe_mode,
};
