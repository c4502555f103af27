//! Trade Lifecycle Value Objects

mod exit_reason;
mod position_state;
mod stop_ack;
mod trade_side;

pub use exit_reason::ExitReason;
pub use position_state::PositionState;
pub use stop_ack::StopAck;
pub use trade_side::TradeSide;
