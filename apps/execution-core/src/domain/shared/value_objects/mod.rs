//! Shared Value Objects
//!
//! Immutable domain types used across bounded contexts.
//! Value objects are compared by value, not identity.

mod identifiers;
mod price;
mod symbol;

pub use identifiers::{BrokerOrderId, ClientOrderId, ExitRetryId, TradeId, UserId};
pub use price::{PRICE_SCALE, round_price};
pub use symbol::Symbol;
