//! Shared Domain Types
//!
//! Value objects, the lifecycle state machine and errors shared across bounded contexts.

pub mod errors;
pub mod state_machine;
pub mod value_objects;

pub use errors::{DomainError, RepositoryError, StateMachineError};
pub use state_machine::{LifecycleState, TransitionContext, TransitionRecord, check_transition};
pub use value_objects::{
    BrokerOrderId, ClientOrderId, ExitRetryId, PRICE_SCALE, Symbol, TradeId, UserId, round_price,
};
