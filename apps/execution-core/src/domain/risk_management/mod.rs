//! Risk Management Bounded Context
//!
//! Decides whether a proposed order may proceed.
//!
//! # Key Concepts
//!
//! - **Risk Snapshot**: guard flags, equity, open exposure, cooldown and quote,
//!   captured once and passed in explicitly
//! - **Risk Gate**: ordered, short-circuiting checks returning `Allow` or a
//!   coded rejection

pub mod services;
pub mod value_objects;

pub use services::RiskGate;
pub use value_objects::{
    OpenExposure, RejectCode, RiskDecision, RiskLimits, RiskRejection, RiskRequest, RiskSnapshot,
};
