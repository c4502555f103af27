//! Trade Lifecycle Domain Services

mod pnl;
mod trade_state_machine;

pub use pnl::{realized_pnl, risk_amount};
