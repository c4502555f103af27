//! Trade lifecycle errors.

use thiserror::Error;

use super::value_objects::PositionState;
use crate::domain::shared::StateMachineError;

/// Errors raised by the trade aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TradeError {
    /// Lifecycle transition refused.
    #[error(transparent)]
    StateMachine(#[from] StateMachineError),

    /// Trade no longer accepts this kind of change.
    #[error("trade {id} is {state}; only audit metadata may change")]
    Frozen {
        /// Trade id.
        id: String,
        /// Current state.
        state: PositionState,
    },

    /// Operation requires a different state.
    #[error("trade {id} is {state}, expected {expected}")]
    WrongState {
        /// Trade id.
        id: String,
        /// Current state.
        state: PositionState,
        /// Required state(s).
        expected: &'static str,
    },

    /// Invalid trade parameters.
    #[error("invalid trade parameter {field}: {message}")]
    InvalidParameters {
        /// Field with invalid value.
        field: String,
        /// Error message.
        message: String,
    },
}
