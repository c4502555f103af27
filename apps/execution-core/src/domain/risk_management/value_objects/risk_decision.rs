//! Risk gate verdict.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable rejection codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectCode {
    /// Emergency mode is active.
    EmergencyHalt,
    /// Safe mode is active.
    SafeMode,
    /// Equity is not positive.
    InvalidEquity,
    /// Daily realized loss limit reached.
    DailyLossLimit,
    /// Too many open positions.
    MaxOpenPositions,
    /// Symbol was exited too recently.
    SymbolCooldown,
    /// Too correlated with an open position.
    HighCorrelation,
    /// Entry has no protective stop.
    MissingStop,
    /// Portfolio heat ceiling would be exceeded.
    PortfolioHeat,
    /// No usable two-sided quote.
    NoQuote,
    /// Spread too wide.
    WideSpread,
    /// Request failed validation.
    InvalidRequest,
    /// Live order without active broker credentials.
    CredentialsRevoked,
}

impl RejectCode {
    /// Stable code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::EmergencyHalt => "EMERGENCY_HALT",
            Self::SafeMode => "SAFE_MODE",
            Self::InvalidEquity => "INVALID_EQUITY",
            Self::DailyLossLimit => "DAILY_LOSS_LIMIT",
            Self::MaxOpenPositions => "MAX_OPEN_POSITIONS",
            Self::SymbolCooldown => "SYMBOL_COOLDOWN",
            Self::HighCorrelation => "HIGH_CORRELATION",
            Self::MissingStop => "MISSING_STOP",
            Self::PortfolioHeat => "PORTFOLIO_HEAT",
            Self::NoQuote => "NO_QUOTE",
            Self::WideSpread => "WIDE_SPREAD",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::CredentialsRevoked => "CREDENTIALS_REVOKED",
        }
    }
}

impl fmt::Display for RejectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an order was declined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskRejection {
    /// Stable code.
    pub code: RejectCode,
    /// Human-readable message.
    pub message: String,
    /// Configured limit, when one applies.
    pub threshold: Option<Decimal>,
    /// Observed value, when one applies.
    pub current_value: Option<Decimal>,
}

impl RiskRejection {
    /// Rejection without numeric context.
    pub fn new(code: RejectCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            threshold: None,
            current_value: None,
        }
    }

    /// Attach the limit and the observed value.
    #[must_use]
    pub const fn with_values(mut self, threshold: Decimal, current_value: Decimal) -> Self {
        self.threshold = Some(threshold);
        self.current_value = Some(current_value);
        self
    }
}

impl fmt::Display for RiskRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Gate verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskDecision {
    /// Every check passed.
    Allow,
    /// First failing check.
    Reject(RiskRejection),
}

impl RiskDecision {
    /// Returns true if the order may proceed.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// The rejection, if any.
    #[must_use]
    pub const fn rejection(&self) -> Option<&RiskRejection> {
        match self {
            Self::Allow => None,
            Self::Reject(rejection) => Some(rejection),
        }
    }
}
