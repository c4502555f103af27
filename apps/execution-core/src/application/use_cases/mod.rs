//! Application Use Cases
//!
//! Use cases orchestrate domain logic to fulfill application requirements.

mod circuit_breaker;
mod enforce_stops;
mod evaluate_risk;
mod execute_order;
mod exit_retry;
mod panic;
mod reconcile;
mod trade_lifecycle;

pub use circuit_breaker::{CircuitBreakerUseCase, DailyResetSummary};
pub use enforce_stops::{
    EnforceStopsUseCase, EnforcementSummary, StopEnforcementError, StopEnforcementPolicy,
};
pub use evaluate_risk::{EvaluateRiskUseCase, RiskAssessment, RiskEvaluationError};
pub use execute_order::{
    ExecuteOrderCommand, ExecuteOrderUseCase, ExecutionError, ExecutionPolicy,
};
pub use exit_retry::{
    AttemptReport, EnqueueReport, ExitRetryCoordinator, ExitRetryError, SweepSummary,
};
pub use panic::{PanicError, PanicReport, PanicUseCase};
pub use reconcile::{
    Mismatch, MismatchKind, ReconcileUseCase, ReconciliationError, ReconciliationPolicy,
    ReconciliationReport,
};
pub use trade_lifecycle::{FinalizeOutcome, TradeLifecycleError, TradeLifecycleUseCase};
