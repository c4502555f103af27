//! Configuration validation.

use rust_decimal::Decimal;

use super::{Config, ConfigError};
use crate::domain::order_execution::TradingMode;
use crate::domain::supervision::FailureMode;

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

fn check_fraction(name: &str, value: Decimal) -> Result<(), ConfigError> {
    if value <= Decimal::ZERO || value > Decimal::ONE {
        return Err(invalid(format!("{name} must be in (0, 1], got {value}")));
    }
    Ok(())
}

fn check_positive(name: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(invalid(format!("{name} must be positive")));
    }
    Ok(())
}

/// Validate configuration values.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.http_port == config.server.metrics_port {
        return Err(invalid("http_port and metrics_port must be different"));
    }

    let risk = &config.risk;
    check_fraction("risk.daily_loss_limit", risk.daily_loss_limit)?;
    check_fraction("risk.weekly_loss_limit", risk.weekly_loss_limit)?;
    check_fraction("risk.monthly_loss_limit", risk.monthly_loss_limit)?;
    check_fraction("risk.portfolio_heat_ceiling", risk.portfolio_heat_ceiling)?;
    if !(0.0..=1.0).contains(&risk.correlation_threshold) || risk.correlation_threshold == 0.0 {
        return Err(invalid("risk.correlation_threshold must be in (0, 1]"));
    }
    if risk.max_open_positions == 0 {
        return Err(invalid("risk.max_open_positions must be positive"));
    }
    if risk.cooldown_minutes < 0 {
        return Err(invalid("risk.cooldown_minutes must not be negative"));
    }
    if risk.max_spread_pct <= Decimal::ZERO {
        return Err(invalid("risk.max_spread_pct must be positive"));
    }

    let execution = &config.execution;
    check_positive("execution.poll_interval_ms", execution.poll_interval_ms)?;
    check_positive("execution.poll_deadline_secs", execution.poll_deadline_secs)?;
    if execution.max_poll_attempts == 0 {
        return Err(invalid("execution.max_poll_attempts must be positive"));
    }

    let cost = &config.cost_model;
    if cost.spread_capture < Decimal::ZERO || cost.spread_capture > Decimal::ONE {
        return Err(invalid("cost_model.spread_capture must be in [0, 1]"));
    }
    if cost.slippage_bps < Decimal::ZERO
        || cost.commission_per_share < Decimal::ZERO
        || cost.commission_minimum < Decimal::ZERO
        || cost.sell_tax_bps < Decimal::ZERO
    {
        return Err(invalid("cost_model values must not be negative"));
    }

    let exits = &config.exit_retry;
    if exits.max_attempts == 0 {
        return Err(invalid("exit_retry.max_attempts must be positive"));
    }
    check_positive("exit_retry.base_backoff_ms", exits.base_backoff_ms)?;
    check_positive("exit_retry.sweep_interval_secs", exits.sweep_interval_secs)?;
    if exits.max_backoff_ms < exits.base_backoff_ms {
        return Err(invalid(
            "exit_retry.max_backoff_ms must not be below base_backoff_ms",
        ));
    }
    if exits.concurrency == 0 {
        return Err(invalid("exit_retry.concurrency must be positive"));
    }

    check_positive("stops.ack_timeout_secs", config.stops.ack_timeout_secs)?;
    check_positive("stops.sweep_interval_secs", config.stops.sweep_interval_secs)?;
    check_positive("reconciliation.interval_secs", config.reconciliation.interval_secs)?;
    check_positive("supervisor.check_interval_secs", config.supervisor.check_interval_secs)?;
    if config.supervisor.max_consecutive_losses == 0 {
        return Err(invalid("supervisor.max_consecutive_losses must be positive"));
    }

    if config.accounts.default_capital <= Decimal::ZERO {
        return Err(invalid("accounts.default_capital must be positive"));
    }

    Ok(())
}

/// Non-fatal observations about a valid configuration, logged at startup.
#[must_use]
pub fn startup_warnings(config: &Config) -> Vec<String> {
    let mut warnings = Vec::new();
    if config.execution.mode == TradingMode::Live && config.accounts.live_users.is_empty() {
        warnings.push("LIVE mode configured but no live_users have credentials".to_string());
    }
    if config.execution.mode == TradingMode::Live && !config.reconciliation.safe_mode_on_mismatch {
        warnings.push("LIVE mode with safe_mode_on_mismatch disabled".to_string());
    }
    if config.stops.failure_mode == FailureMode::Panic {
        warnings.push("stops.failure_mode is PANIC: a single stop failure flattens every user".to_string());
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
        assert!(startup_warnings(&Config::default()).is_empty());
    }

    #[test_case(dec!(0) ; "zero")]
    #[test_case(dec!(-0.01) ; "negative")]
    #[test_case(dec!(1.5) ; "above one")]
    fn loss_fraction_outside_unit_interval_is_rejected(value: Decimal) {
        let mut config = Config::default();
        config.risk.weekly_loss_limit = value;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("weekly_loss_limit"));
    }

    #[test]
    fn same_ports_rejected() {
        let mut config = Config::default();
        config.server.metrics_port = config.server.http_port;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn zero_interval_rejected() {
        let mut config = Config::default();
        config.reconciliation.interval_secs = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("reconciliation.interval_secs"));
    }

    #[test]
    fn zero_attempt_ceiling_rejected() {
        let mut config = Config::default();
        config.exit_retry.max_attempts = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn live_without_users_warns() {
        let mut config = Config::default();
        config.execution.mode = TradingMode::Live;
        assert_eq!(startup_warnings(&config).len(), 1);
    }
}
