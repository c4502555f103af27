//! Supervision Bounded Context
//!
//! The system guard singleton (safe mode, emergency mode, reconciliation
//! bookkeeping) and the loss counters and limits behind entry halts.

pub mod aggregate;
pub mod repository;
pub mod services;
pub mod value_objects;

pub use aggregate::{Halt, LossCounters, SystemGuardState};
pub use repository::{LossCounterRepository, SystemGuardRepository};
pub use services::{LimitBreach, LossLimits};
pub use value_objects::{FailureMode, HaltReason};
