//! Order Execution Domain Services

mod cost_model;
mod order_state_machine;

pub use cost_model::{CostModel, CostModelConfig};
pub use order_state_machine::OrderStateMachine;
