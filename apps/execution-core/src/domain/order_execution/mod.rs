//! Order Execution Bounded Context
//!
//! Order intents, their lifecycle graph, and the execution cost model.
//!
//! # Key Concepts
//!
//! - **Order Intent**: one attempted broker order, keyed by a client id
//! - **Lifecycle**: `created -> sent -> acked -> partially_filled* -> filled | rejected | cancelled | unknown`
//! - **Cost Model**: spread, slippage, commission and tax estimate vs. realized

pub mod aggregate;
pub mod errors;
pub mod repository;
pub mod services;
pub mod value_objects;

pub use aggregate::{NewOrderIntent, OrderIntent};
pub use errors::OrderError;
pub use repository::OrderIntentRepository;
pub use services::{CostModel, CostModelConfig, OrderStateMachine};
pub use value_objects::{
    ExecutionCost, ExecutionReport, OrderPurpose, OrderSide, OrderStatus, OrderType, Quote,
    TradingMode,
};
