//! Account Ports (Driven Ports)
//!
//! Per-user capital, broker credentials and symbol correlations. The risk
//! gate, circuit breaker and panic path read these; their storage lives
//! outside this core.

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::PortError;
use crate::domain::shared::{Symbol, UserId};

/// Capital figures used by the risk gate and the circuit breaker.
#[async_trait]
pub trait CapitalPort: Send + Sync {
    /// Current account equity.
    async fn equity(&self, user_id: &UserId) -> Result<Decimal, PortError>;

    /// Capital that loss-limit fractions are measured against.
    async fn starting_capital(&self, user_id: &UserId) -> Result<Decimal, PortError>;
}

/// Stored broker credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Users with live broker credentials.
    async fn active_users(&self) -> Result<Vec<UserId>, PortError>;

    /// Whether a user can place live orders.
    async fn has_active_credentials(&self, user_id: &UserId) -> Result<bool, PortError>;

    /// Revoke every stored credential. Returns how many were revoked.
    async fn revoke_all(&self) -> Result<usize, PortError>;
}

/// Pairwise return correlation between symbols.
#[async_trait]
pub trait CorrelationPort: Send + Sync {
    /// Correlation in [-1, 1], if known.
    async fn correlation(&self, a: &Symbol, b: &Symbol) -> Result<Option<f64>, PortError>;
}
