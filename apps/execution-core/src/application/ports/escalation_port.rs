//! Escalation Port (Driven Port)
//!
//! Requests a global emergency panic. Components that detect a system-wide
//! failure (dead-lettered exit, unacknowledged stop in panic mode, broker
//! unreachable) escalate through this port instead of calling the panic
//! path directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PortError;
use crate::domain::supervision::HaltReason;

/// A request to run the emergency panic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanicRequest {
    /// Trigger.
    pub reason: HaltReason,
    /// Free-text detail.
    pub detail: String,
    /// When it was requested.
    pub requested_at: DateTime<Utc>,
}

/// Port for requesting a panic.
#[async_trait]
pub trait EscalationPort: Send + Sync {
    /// Queue a panic request.
    async fn request_panic(&self, request: PanicRequest) -> Result<(), PortError>;
}
