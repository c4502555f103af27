// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Execution Core - Rust Library
//!
//! Order execution and risk-control core for an automated trading system.
//!
//! # Architecture (Clean Architecture + DDD + Hexagonal)
//!
//! ## Layers (inside → outside)
//!
//! - **Domain**: Core business logic (aggregates, value objects, domain services)
//!   - `order_execution`: Order intents, status lifecycle, paper cost model
//!   - `trade_lifecycle`: Trades, protective stops, realized P&L
//!   - `risk_management`: Pre-trade risk gate
//!   - `exit_retry`: Exit retry requests and backoff
//!   - `supervision`: Safe mode, emergency mode, loss counters
//!   - `idempotency`: Deduplication of external commands
//!
//! - **Application**: Use cases and orchestration
//!   - `ports`: Interfaces for external systems (`BrokerPort`, `Clock`, ...)
//!   - `services`: System guard, idempotency guard, cooldowns, scheduler
//!   - `use_cases`: Execute, risk, lifecycle, exit retry, stops, reconcile, panic
//!
//! - **Infrastructure**: Adapters (implementations)
//!   - `broker`: Paper broker
//!   - `persistence`: In-memory repositories
//!   - `http`: REST API
//!   - `config`: Dependency injection container

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Clean Architecture Layers
// =============================================================================

/// Domain layer - Core business logic with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Cross-cutting
// =============================================================================

/// YAML configuration loading and validation.
pub mod config;

/// Logging and Prometheus metrics.
pub mod observability;

// =============================================================================
// Re-exports
// =============================================================================

// Domain re-exports
pub use domain::order_execution::{
    ExecutionReport, OrderIntent, OrderPurpose, OrderSide, OrderStatus, OrderType, TradingMode,
};
pub use domain::shared::{ClientOrderId, Symbol, TradeId, UserId};
pub use domain::trade_lifecycle::{ExitReason, Trade};

// Application re-exports
pub use application::ports::{BrokerError, BrokerPort, Clock};
pub use application::services::{IdempotencyGuard, Scheduler, SystemGuardService};
pub use application::use_cases::{
    ExecuteOrderCommand, ExecuteOrderUseCase, ExitRetryCoordinator, PanicUseCase,
    ReconcileUseCase, TradeLifecycleUseCase,
};

// Infrastructure re-exports
pub use config::{Config, ConfigError, load_config};
pub use infrastructure::broker::PaperBroker;
pub use infrastructure::clock::{ManualClock, SystemClock};
pub use infrastructure::config::Container;
pub use infrastructure::http::{AppState, create_router};
