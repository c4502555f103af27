//! HTTP response DTOs.

use serde::{Deserialize, Serialize};

use crate::application::use_cases::{AttemptReport, EnqueueReport, ReconciliationReport};
use crate::domain::exit_retry::ExitRetryRequest;
use crate::domain::order_execution::{ExecutionReport, OrderIntent};
use crate::domain::shared::{TradeId, TransitionRecord};

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
}

/// Result of an order entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOrderResponse {
    /// Current order projection.
    pub order: ExecutionReport,
    /// Trade opened by a filled entry with a protective stop.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub trade_id: Option<TradeId>,
}

/// An order with its transition history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetailResponse {
    /// The order intent.
    pub order: OrderIntent,
    /// Every recorded transition, oldest first.
    pub history: Vec<TransitionRecord>,
}

/// Result of a manual exit request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitResponse {
    /// The exit request as stored.
    pub request: ExitRetryRequest,
    /// False when an unresolved request already existed.
    pub created: bool,
    /// Outcome of the immediate attempt, for new requests.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub outcome: Option<String>,
}

impl From<EnqueueReport> for ExitResponse {
    fn from(report: EnqueueReport) -> Self {
        let outcome = report.attempt.map(|attempt| match attempt {
            AttemptReport::Filled { exit_price, .. } => format!("filled at {exit_price}"),
            AttemptReport::AlreadyClosed => "already closed".to_string(),
            AttemptReport::RetryScheduled { at, error } => {
                format!("retry scheduled at {at}: {error}")
            }
            AttemptReport::DeadLettered { error } => format!("dead-lettered: {error}"),
            AttemptReport::Skipped => "skipped".to_string(),
        });
        Self {
            request: report.request,
            created: report.created,
            outcome,
        }
    }
}

/// Result of a safe-mode or emergency clearance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearResponse {
    /// False when the flag was not set.
    pub cleared: bool,
}

/// Result of an on-demand reconciliation run.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileResponse {
    /// No findings and no errors.
    pub clean: bool,
    /// The full report.
    pub report: ReconciliationReport,
}
