//! Order execution errors.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::shared::StateMachineError;

/// Errors that can occur in order execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// Lifecycle transition refused.
    #[error(transparent)]
    StateMachine(#[from] StateMachineError),

    /// Invalid order parameters.
    #[error("invalid order parameter {field}: {message}")]
    InvalidParameters {
        /// Field with invalid value.
        field: String,
        /// Error message.
        message: String,
    },

    /// Broker reported more than was ordered.
    #[error("fill {filled} exceeds order quantity {quantity}")]
    FillExceedsQuantity {
        /// Reported cumulative fill.
        filled: Decimal,
        /// Ordered quantity.
        quantity: Decimal,
    },

    /// Broker reported less than it did before.
    #[error("cumulative fill went backwards: {previous} -> {reported}")]
    FillWentBackwards {
        /// Previously recorded fill.
        previous: Decimal,
        /// Newly reported fill.
        reported: Decimal,
    },
}

impl OrderError {
    /// Shorthand for [`OrderError::InvalidParameters`].
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameters {
            field: field.into(),
            message: message.into(),
        }
    }
}
