//! Prometheus metrics for the execution core.
//!
//! Counters and gauges for order placement, risk rejections, broker
//! failures, stop protection, exit retries and supervision state.
//!
//! # Example
//!
//! ```ignore
//! use execution_core::observability::{init_metrics, MetricsConfig};
//!
//! let config = MetricsConfig::default();
//! init_metrics(&config)?;
//!
//! record_order_placed("paper", "entry");
//! ```

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::{Ipv4Addr, SocketAddr};

/// Configuration for the metrics exporter.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Address to bind the metrics HTTP listener.
    pub listen_addr: SocketAddr,
    /// Histogram buckets for broker poll counts.
    pub poll_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 9090)),
            poll_buckets: vec![1.0, 2.0, 5.0, 10.0, 20.0, 50.0],
        }
    }
}

impl MetricsConfig {
    /// Create a new metrics configuration with custom address.
    #[must_use]
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            listen_addr: addr,
            ..Default::default()
        }
    }
}

/// Initialize the Prometheus metrics exporter.
///
/// This starts an HTTP server that exposes metrics at `/metrics`.
///
/// # Errors
///
/// Returns an error if the metrics exporter fails to start (e.g., port already in use).
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(config.listen_addr)
        .set_buckets(&config.poll_buckets)
        .map_err(|e| MetricsError::Configuration(e.to_string()))?
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    tracing::info!(
        addr = %config.listen_addr,
        "Prometheus metrics exporter started"
    );

    Ok(())
}

/// Error type for metrics operations.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to configure metrics exporter.
    #[error("metrics configuration error: {0}")]
    Configuration(String),
    /// Failed to install metrics exporter.
    #[error("metrics installation error: {0}")]
    Installation(String),
}

// ============================================================================
// Order Execution Metrics
// ============================================================================

/// Record an order accepted for execution.
///
/// # Arguments
///
/// * `mode` - `paper` or `live`
/// * `purpose` - `entry`, `exit`, `stop_loss` or `flatten`
pub fn record_order_placed(mode: &str, purpose: &str) {
    counter!(
        "orders_placed_total",
        "mode" => mode.to_string(),
        "purpose" => purpose.to_string()
    )
    .increment(1);
}

/// Record a risk or validation rejection by its reason code.
pub fn record_order_rejection(code: &str) {
    counter!("order_rejections_total", "code" => code.to_string()).increment(1);
}

/// Record how many status polls a live order needed.
pub fn record_order_polls(final_status: &str, polls: u32) {
    histogram!("order_status_polls", "status" => final_status.to_string()).record(f64::from(polls));
}

/// Record a broker call failure.
///
/// # Arguments
///
/// * `operation` - Port operation (e.g. `place_order`, `cancel_order`)
/// * `kind` - Failure class (`transient`, `rejected`, `not_found`, `unreachable`)
pub fn record_broker_failure(operation: &str, kind: &str) {
    counter!(
        "broker_failures_total",
        "operation" => operation.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

// ============================================================================
// Protection and Exit Metrics
// ============================================================================

/// Record a protective stop that was not acknowledged in time.
pub fn record_stop_loss_failure() {
    counter!("stop_loss_failures_total").increment(1);
}

/// Record a flatten issued by stop enforcement or panic.
pub fn record_emergency_flatten(source: &str) {
    counter!("emergency_flattens_total", "source" => source.to_string()).increment(1);
}

/// Record one exit attempt and its outcome (`filled`, `retry`, `dead_letter`).
pub fn record_exit_attempt(outcome: &str) {
    counter!("exit_retry_attempts_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record a dead-lettered exit.
pub fn record_dead_letter() {
    counter!("exit_dead_letters_total").increment(1);
}

// ============================================================================
// Supervision Metrics
// ============================================================================

/// Record reconciliation findings by kind (`ghost`, `zombie`, `orphan`,
/// `missing_position`).
pub fn record_reconciliation_mismatch(kind: &str, count: usize) {
    counter!("reconciliation_mismatches_total", "kind" => kind.to_string()).increment(count as u64);
}

/// Update the safe mode gauge.
pub fn set_safe_mode(active: bool) {
    gauge!("safe_mode_active").set(if active { 1.0 } else { 0.0 });
}

/// Update the emergency mode gauge.
pub fn set_emergency_mode(active: bool) {
    gauge!("emergency_mode_active").set(if active { 1.0 } else { 0.0 });
}

/// Record an entry halt trip by reason code.
pub fn record_halt(reason: &str) {
    counter!("trading_halts_total", "reason" => reason.to_string()).increment(1);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MetricsConfig::default();
        assert_eq!(config.listen_addr.port(), 9090);
        assert!(!config.poll_buckets.is_empty());
    }

    #[test]
    fn test_config_with_addr() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let config = MetricsConfig::with_addr(addr);
        assert_eq!(config.listen_addr.port(), 8080);
    }

    #[test]
    fn test_recorders_without_exporter() {
        // Without an installed recorder these are no-ops; they must not panic.
        record_order_placed("paper", "entry");
        record_order_rejection("WIDE_SPREAD");
        record_order_polls("filled", 3);
        record_broker_failure("place_order", "transient");
        record_stop_loss_failure();
        record_emergency_flatten("stop_enforcer");
        record_exit_attempt("retry");
        record_dead_letter();
        record_reconciliation_mismatch("ghost", 2);
        set_safe_mode(true);
        set_emergency_mode(false);
        record_halt("DAILY_LOSS_LIMIT");
    }
}
