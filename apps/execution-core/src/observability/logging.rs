//! Structured logging setup.
//!
//! A `tracing-subscriber` registry with an `EnvFilter` (`RUST_LOG`, falling
//! back to the configured filter, then `execution_core=info`) and a console
//! `fmt` layer, optionally JSON.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "execution_core=info";

/// Logging configuration.
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Filter used when `RUST_LOG` is unset; empty means [`DEFAULT_FILTER`].
    pub filter: String,
}

/// Error type for logging setup.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// Failed to initialize the subscriber (usually already set).
    #[error("failed to initialize tracing subscriber: {0}")]
    Subscriber(String),
}

/// Build the filter from `RUST_LOG`, else `fallback`, else [`DEFAULT_FILTER`].
#[must_use]
pub fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directives = if fallback.trim().is_empty() {
            DEFAULT_FILTER
        } else {
            fallback
        };
        EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    })
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns an error if a global subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let registry = tracing_subscriber::registry().with(env_filter(&config.filter));
    let result = if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    };
    result.map_err(|e| LoggingError::Subscriber(e.to_string()))?;

    tracing::info!(json = config.json, "Logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_parses() {
        assert!(DEFAULT_FILTER.parse::<EnvFilter>().is_ok());
    }

    #[test]
    fn bad_fallback_filter_is_replaced() {
        // Builds without panicking; the default is used instead.
        let _ = env_filter("execution_core=[");
        let _ = env_filter("");
    }

    #[test]
    fn second_init_fails_cleanly() {
        let config = LoggingConfig::default();
        let first = init_logging(&config);
        let second = init_logging(&config);
        // Another test may have installed a subscriber first; either way the
        // second call cannot succeed.
        assert!(first.is_ok() || second.is_err());
        assert!(second.is_err());
    }
}
