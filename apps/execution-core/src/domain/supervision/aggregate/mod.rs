//! Supervision Aggregates

mod loss_counters;
mod system_guard;

pub use loss_counters::LossCounters;
pub use system_guard::{Halt, SystemGuardState};
