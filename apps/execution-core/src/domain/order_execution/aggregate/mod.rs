//! Order Execution Aggregates

mod order_intent;

pub use order_intent::{NewOrderIntent, OrderIntent};
