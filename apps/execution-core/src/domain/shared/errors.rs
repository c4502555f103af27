//! Domain errors shared across bounded contexts.

use thiserror::Error;

/// Validation and business-rule errors raised by domain types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Invalid value for a field.
    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        /// Field name.
        field: String,
        /// Error message.
        message: String,
    },

    /// Business rule violation.
    #[error("business rule {rule} violated: {message}")]
    BusinessRuleViolation {
        /// Rule name or code.
        rule: String,
        /// Description of the violation.
        message: String,
    },
}

impl DomainError {
    /// Shorthand for an [`DomainError::InvalidValue`].
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors raised when a lifecycle transition is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateMachineError {
    /// The entity is already in the target state.
    #[error("{entity} {id} is already {state}")]
    NoOpTransition {
        /// Entity type (e.g. "order_intent").
        entity: &'static str,
        /// Entity identifier.
        id: String,
        /// Current (and requested) state.
        state: String,
    },

    /// The edge is not in the entity's adjacency list.
    #[error("illegal {entity} transition for {id}: {from} -> {to}")]
    IllegalTransition {
        /// Entity type.
        entity: &'static str,
        /// Entity identifier.
        id: String,
        /// Current state.
        from: String,
        /// Requested state.
        to: String,
    },
}

/// Errors returned by repository adapters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// No record with the given identifier.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity type.
        entity: &'static str,
        /// Entity identifier.
        id: String,
    },

    /// A uniqueness constraint rejected the insert.
    #[error("{entity} already exists: {id}")]
    Duplicate {
        /// Entity type.
        entity: &'static str,
        /// Conflicting key.
        id: String,
    },

    /// The stored state changed since it was read.
    #[error("stale {entity} {id}: expected {expected}, found {actual}")]
    StaleState {
        /// Entity type.
        entity: &'static str,
        /// Entity identifier.
        id: String,
        /// State the writer read.
        expected: String,
        /// State currently stored.
        actual: String,
    },

    /// Underlying storage failure.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl RepositoryError {
    /// Returns true if a concurrent writer won the race.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Duplicate { .. } | Self::StaleState { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_machine_error_display() {
        let err = StateMachineError::IllegalTransition {
            entity: "order_intent",
            id: "abc".to_string(),
            from: "created".to_string(),
            to: "filled".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "illegal order_intent transition for abc: created -> filled"
        );
    }

    #[test]
    fn repository_conflicts() {
        let stale = RepositoryError::StaleState {
            entity: "trade",
            id: "t-1".to_string(),
            expected: "open".to_string(),
            actual: "closed".to_string(),
        };
        assert!(stale.is_conflict());
        assert!(!RepositoryError::Storage("disk".to_string()).is_conflict());
    }
}
