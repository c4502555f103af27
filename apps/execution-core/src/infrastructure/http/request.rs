//! HTTP request DTOs.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::application::use_cases::ExecuteOrderCommand;
use crate::domain::order_execution::{OrderPurpose, OrderSide, OrderType, TradingMode};
use crate::domain::shared::{ClientOrderId, Symbol, TradeId, UserId};

/// Order entry request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOrderRequest {
    /// Caller-chosen client key; generated when absent.
    #[serde(default)]
    pub client_order_id: Option<String>,
    /// Symbol to trade.
    pub symbol: String,
    /// Order side.
    pub side: OrderSide,
    /// Quantity.
    pub quantity: Decimal,
    /// Order type.
    #[serde(default = "default_order_type")]
    pub order_type: OrderType,
    /// Limit price (limit orders).
    #[serde(default)]
    pub limit_price: Option<Decimal>,
    /// Stop price (stop orders).
    #[serde(default)]
    pub stop_price: Option<Decimal>,
    /// Protective stop; an entry that fills with one opens a trade.
    #[serde(default)]
    pub protective_stop: Option<Decimal>,
    /// Order purpose.
    #[serde(default = "default_purpose")]
    pub purpose: OrderPurpose,
    /// Paper or live; the configured mode when absent.
    #[serde(default)]
    pub mode: Option<TradingMode>,
    /// Trade the order belongs to.
    #[serde(default)]
    pub trade_id: Option<String>,
}

const fn default_order_type() -> OrderType {
    OrderType::Market
}

const fn default_purpose() -> OrderPurpose {
    OrderPurpose::Entry
}

impl SubmitOrderRequest {
    /// Engine command for `user_id`.
    #[must_use]
    pub fn into_command(self, user_id: UserId, default_mode: TradingMode) -> ExecuteOrderCommand {
        ExecuteOrderCommand {
            client_order_id: self.client_order_id.map(ClientOrderId::new),
            user_id,
            symbol: Symbol::new(self.symbol),
            side: self.side,
            quantity: self.quantity,
            order_type: self.order_type,
            limit_price: self.limit_price,
            stop_price: self.stop_price,
            protective_stop: self.protective_stop,
            purpose: self.purpose,
            mode: self.mode.unwrap_or(default_mode),
            trade_id: self.trade_id.map(TradeId::new),
        }
    }
}

/// Operator panic request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanicCommand {
    /// Why the operator is pulling the plug.
    #[serde(default)]
    pub detail: Option<String>,
}

/// Operator clearance request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorRequest {
    /// Operator name for the audit trail; the caller id when absent.
    #[serde(default)]
    pub operator: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn minimal_order_uses_defaults() {
        let json = r#"{"symbol":"aapl","side":"BUY","quantity":"10"}"#;
        let request: SubmitOrderRequest = serde_json::from_str(json).unwrap();
        let command = request.into_command(UserId::new("u-1"), TradingMode::Paper);

        assert_eq!(command.symbol, Symbol::new("AAPL"));
        assert_eq!(command.quantity, dec!(10));
        assert_eq!(command.order_type, OrderType::Market);
        assert_eq!(command.purpose, OrderPurpose::Entry);
        assert_eq!(command.mode, TradingMode::Paper);
        assert!(command.client_order_id.is_none());
    }
}
