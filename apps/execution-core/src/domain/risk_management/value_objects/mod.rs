//! Risk Management Value Objects

mod risk_decision;
mod risk_limits;
mod risk_request;
mod risk_snapshot;

pub use risk_decision::{RejectCode, RiskDecision, RiskRejection};
pub use risk_limits::RiskLimits;
pub use risk_request::RiskRequest;
pub use risk_snapshot::{OpenExposure, RiskSnapshot};
