//! Order Execution Value Objects
//!
//! Immutable types for order management.

mod execution_cost;
mod execution_report;
mod order_purpose;
mod order_side;
mod order_status;
mod order_type;
mod quote;
mod trading_mode;

pub use execution_cost::ExecutionCost;
pub use execution_report::ExecutionReport;
pub use order_purpose::OrderPurpose;
pub use order_side::OrderSide;
pub use order_status::OrderStatus;
pub use order_type::OrderType;
pub use quote::Quote;
pub use trading_mode::TradingMode;
