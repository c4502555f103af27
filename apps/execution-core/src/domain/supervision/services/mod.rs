//! Supervision Domain Services

mod loss_limits;

pub use loss_limits::{LimitBreach, LossLimits};
