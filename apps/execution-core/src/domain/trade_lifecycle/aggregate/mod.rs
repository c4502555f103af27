//! Trade Lifecycle Aggregates

mod trade;

pub use trade::{NewTrade, PriceObservation, Trade, TradeNote};
