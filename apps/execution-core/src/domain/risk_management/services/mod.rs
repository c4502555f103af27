//! Risk Management Domain Services

mod risk_gate;

pub use risk_gate::RiskGate;
