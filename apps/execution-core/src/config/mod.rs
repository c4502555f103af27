//! Configuration module for the execution core.
//!
//! Loads `config.yaml` (or the file named by `EXECUTION_CORE_CONFIG`),
//! interpolates environment variables, parses it into typed sections and
//! validates the result.
//!
//! # Usage
//!
//! ```rust,ignore
//! use execution_core::config::load_config;
//!
//! let config = load_config(None)?;
//! println!("HTTP port: {}", config.server.http_port);
//! ```

mod accounts;
mod execution;
mod exit_retry;
mod observability;
mod reconciliation;
mod risk;
mod server;
mod stops;
mod supervisor;
mod validation;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use accounts::AccountsConfig;
pub use execution::ExecutionConfig;
pub use exit_retry::ExitRetryConfig;
pub use observability::ObservabilityConfig;
pub use reconciliation::ReconciliationConfig;
pub use risk::RiskConfig;
pub use server::ServerConfig;
pub use stops::StopsConfig;
pub use supervisor::SupervisorConfig;
pub use validation::{startup_warnings, validate_config};

use crate::application::services::SchedulerConfig;
use crate::domain::order_execution::CostModelConfig;
use crate::domain::supervision::LossLimits;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "EXECUTION_CORE_CONFIG";

/// Config file used when nothing else is named.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure. Every section has defaults, so an empty
/// file is a valid paper-trading configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP and metrics listeners.
    pub server: ServerConfig,
    /// Pre-trade risk thresholds and loss-limit fractions.
    pub risk: RiskConfig,
    /// Trading mode and live polling budget.
    pub execution: ExecutionConfig,
    /// Paper fill cost model.
    pub cost_model: CostModelConfig,
    /// Exit retry budget and sweep.
    pub exit_retry: ExitRetryConfig,
    /// Protective stop enforcement.
    pub stops: StopsConfig,
    /// Broker reconciliation.
    pub reconciliation: ReconciliationConfig,
    /// Loss supervisor.
    pub supervisor: SupervisorConfig,
    /// Starting capital and live credentials.
    pub accounts: AccountsConfig,
    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Loss limits assembled from the risk and supervisor sections.
    #[must_use]
    pub const fn loss_limits(&self) -> LossLimits {
        LossLimits {
            max_consecutive_losses: self.supervisor.max_consecutive_losses,
            daily_loss_limit: self.risk.daily_loss_limit,
            weekly_loss_limit: self.risk.weekly_loss_limit,
            monthly_loss_limit: self.risk.monthly_loss_limit,
        }
    }

    /// Periods of the background tasks.
    #[must_use]
    pub const fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            reconciliation_interval: self.reconciliation.interval(),
            stop_sweep_interval: self.stops.sweep_interval(),
            exit_sweep_interval: self.exit_retry.sweep_interval(),
            supervisor_interval: self.supervisor.check_interval(),
        }
    }
}

// ============================================
// Configuration Loading
// ============================================

/// Resolve the config path: explicit argument, then `EXECUTION_CORE_CONFIG`,
/// then `config.yaml`.
#[must_use]
pub fn config_path(explicit: Option<&str>) -> String {
    explicit.map_or_else(
        || std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string()),
        str::to_string,
    )
}

/// Load configuration from a YAML file with environment variable interpolation.
///
/// A missing file is an error; use an empty file for all defaults.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = config_path(path);

    let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadError {
        path: path.clone(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = if interpolated.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml_bw::from_str(&interpolated)?
    };
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax. Unset variables
/// without a default become empty.
#[allow(clippy::expect_used)] // Regex is compile-time constant
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |cap: &regex::Captures<'_>| {
        let default_value = cap.get(2).map(|m| m.as_str());
        match std::env::var(&cap[1]) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.map_or_else(String::new, str::to_string),
        }
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order_execution::TradingMode;
    use crate::domain::supervision::FailureMode;
    use rust_decimal_macros::dec;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn empty_file_is_default_paper_config() {
        let config = load_config_from_string("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.execution.mode, TradingMode::Paper);
        assert_eq!(config.stops.failure_mode, FailureMode::Safe);
    }

    #[test]
    fn env_var_with_default_when_missing() {
        let input = "mode: ${EXECUTION_CORE_TEST_NONEXISTENT_VAR:-PAPER}";
        assert_eq!(interpolate_env_vars(input), "mode: PAPER");
    }

    #[test]
    #[expect(clippy::literal_string_with_formatting_args)] // ${...} is env var syntax
    fn env_var_with_default_uses_existing() {
        let input = "path: ${PATH:-default}";
        let result = interpolate_env_vars(input);
        assert_ne!(result, "path: default");
        assert!(result.starts_with("path: "));
    }

    #[test]
    fn env_var_without_default_becomes_empty() {
        let input = "key: ${EXECUTION_CORE_TEST_UNLIKELY_TO_EXIST}";
        assert_eq!(interpolate_env_vars(input), "key: ");
    }

    #[test]
    fn full_config_parse() {
        let yaml = r#"
server:
  http_port: 8080
  metrics_port: 9091
  bind_address: "127.0.0.1"

risk:
  daily_loss_limit: 0.02
  max_open_positions: 3
  portfolio_heat_ceiling: 0.05
  correlation_threshold: 0.7
  cooldown_minutes: 15

execution:
  mode: LIVE
  poll_interval_ms: 250
  max_poll_attempts: 40

cost_model:
  slippage_bps: 2
  commission_per_share: 0.005

exit_retry:
  max_attempts: 5
  base_backoff_ms: 1000
  max_backoff_ms: 60000
  concurrency: 8

stops:
  failure_mode: PANIC
  trailing_enabled: true

reconciliation:
  interval_secs: 120
  safe_mode_on_mismatch: false

supervisor:
  max_consecutive_losses: 4

accounts:
  default_capital: 50000
  live_users: ["alice"]

observability:
  json_logs: true
"#;

        let config = load_config_from_string(yaml).unwrap();

        assert_eq!(config.server.http_port, 8080);
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.risk.daily_loss_limit, dec!(0.02));
        assert_eq!(config.risk.max_open_positions, 3);
        assert_eq!(config.execution.mode, TradingMode::Live);
        assert_eq!(config.execution.policy().poll_interval, Duration::from_millis(250));
        assert_eq!(config.cost_model.slippage_bps, dec!(2));
        assert_eq!(config.exit_retry.backoff().max_attempts, 5);
        assert_eq!(config.exit_retry.concurrency, 8);
        assert_eq!(config.stops.failure_mode, FailureMode::Panic);
        assert!(config.stops.trailing_enabled);
        assert!(!config.reconciliation.safe_mode_on_mismatch);
        assert_eq!(config.loss_limits().max_consecutive_losses, 4);
        assert_eq!(config.accounts.default_capital, dec!(50000));
        assert_eq!(config.accounts.live_users, vec!["alice".to_string()]);
        assert!(config.observability.json_logs);
        assert_eq!(config.scheduler().reconciliation_interval, Duration::from_secs(120));
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let config = load_config_from_string(include_str!("../../config.yaml")).unwrap();
        assert_eq!(config.risk, RiskConfig::default());
        assert_eq!(config.stops, StopsConfig::default());
        assert_eq!(config.exit_retry, ExitRetryConfig::default());
        assert_eq!(config.cost_model, CostModelConfig::default());
        assert_eq!(config.accounts, AccountsConfig::default());
    }

    #[test]
    fn validation_errors_surface_from_loading() {
        let yaml = "exit_retry:\n  base_backoff_ms: 5000\n  max_backoff_ms: 1000\n";
        let err = load_config_from_string(yaml).unwrap_err();
        assert!(err.to_string().contains("max_backoff_ms"));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server:\n  http_port: 7000").unwrap();

        let config = load_config(file.path().to_str()).unwrap();
        assert_eq!(config.server.http_port, 7000);
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = load_config(Some("/nonexistent/execution-core.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }
}
