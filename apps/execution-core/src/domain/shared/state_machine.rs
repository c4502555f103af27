//! Lifecycle State Machine
//!
//! A generic "is this edge legal" check plus the audit record written for every
//! accepted transition. Order intents and trades each declare their own
//! adjacency list through [`LifecycleState`]; neither knows about the other.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::StateMachineError;

/// A state in an entity lifecycle graph.
pub trait LifecycleState:
    Copy + Eq + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Entity type name used in errors and audit records.
    const ENTITY: &'static str;

    /// States reachable from `self` in one step.
    fn successors(self) -> &'static [Self];

    /// A state with no outgoing edges.
    fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }

    /// Whether `to` is a legal next state.
    fn can_transition_to(self, to: Self) -> bool {
        self.successors().contains(&to)
    }
}

/// Validate a transition for the entity `id`.
///
/// # Errors
///
/// Returns [`StateMachineError::NoOpTransition`] when `from == to` and
/// [`StateMachineError::IllegalTransition`] when the edge is not declared.
pub fn check_transition<S: LifecycleState>(
    id: &str,
    from: S,
    to: S,
) -> Result<(), StateMachineError> {
    if from == to {
        return Err(StateMachineError::NoOpTransition {
            entity: S::ENTITY,
            id: id.to_string(),
            state: from.to_string(),
        });
    }

    if !from.can_transition_to(to) {
        return Err(StateMachineError::IllegalTransition {
            entity: S::ENTITY,
            id: id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    Ok(())
}

/// Why a transition was requested.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionContext {
    /// Short machine-friendly reason.
    pub reason: String,
    /// Optional free-text detail.
    pub detail: Option<String>,
    /// Correlates transitions caused by the same request or sweep.
    pub correlation_id: Option<String>,
}

impl TransitionContext {
    /// Create a context with only a reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            detail: None,
            correlation_id: None,
        }
    }

    /// Attach free-text detail.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Attach a correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// Append-only audit entry for one accepted transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// Entity type.
    pub entity_type: String,
    /// Entity identifier.
    pub entity_id: String,
    /// State before the transition.
    pub from_state: String,
    /// State after the transition.
    pub to_state: String,
    /// Short reason.
    pub reason: String,
    /// Free-text detail.
    pub detail: Option<String>,
    /// Correlation id.
    pub correlation_id: Option<String>,
    /// When the transition was applied.
    pub occurred_at: DateTime<Utc>,
}

impl TransitionRecord {
    /// Build the record for a validated transition.
    pub fn new<S: LifecycleState>(
        entity_id: &str,
        from: S,
        to: S,
        context: &TransitionContext,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            entity_type: S::ENTITY.to_string(),
            entity_id: entity_id.to_string(),
            from_state: from.to_string(),
            to_state: to.to_string(),
            reason: context.reason.clone(),
            detail: context.detail.clone(),
            correlation_id: context.correlation_id.clone(),
            occurred_at,
        }
    }
}
