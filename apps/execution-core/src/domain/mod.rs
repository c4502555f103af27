//! Domain Layer
//!
//! The innermost layer containing business logic with zero infrastructure dependencies.
//! This layer defines:
//!
//! - **Aggregates**: Consistency boundaries with invariants
//! - **Value Objects**: Immutable domain types with equality by value
//! - **Domain Services**: Stateless business logic
//! - **Repository Traits**: Persistence abstractions (implemented in infrastructure)
//!
//! # Bounded Contexts
//!
//! - [`order_execution`]: Order intents, their state machine and the cost model
//! - [`trade_lifecycle`]: Positions, protective stops and realized P&L
//! - [`risk_management`]: The pre-trade risk gate
//! - [`exit_retry`]: Exit retry requests and backoff
//! - [`supervision`]: System guard, loss counters and limits
//! - [`idempotency`]: Deduplication of external requests

pub mod exit_retry;
pub mod idempotency;
pub mod order_execution;
pub mod risk_management;
pub mod shared;
pub mod supervision;
pub mod trade_lifecycle;
