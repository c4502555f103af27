//! Trade Lifecycle Bounded Context
//!
//! Positions opened by entry fills: protective stop acknowledgement, trailing
//! stop, and realized P&L on close.

pub mod aggregate;
pub mod errors;
pub mod repository;
pub mod services;
pub mod value_objects;

pub use aggregate::{NewTrade, PriceObservation, Trade, TradeNote};
pub use errors::TradeError;
pub use repository::TradeRepository;
pub use services::{realized_pnl, risk_amount};
pub use value_objects::{ExitReason, PositionState, StopAck, TradeSide};
