//! Broker Port (Driven Port)
//!
//! Interface for placing and tracking orders at a brokerage. Paper and live
//! trading each provide an implementation; the execution engine and the
//! reconciliation service only see this trait.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order_execution::{OrderSide, OrderStatus, OrderType, Quote};
use crate::domain::shared::{BrokerOrderId, ClientOrderId, Symbol, UserId};

/// Request to place an order at the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    /// Client order ID.
    pub client_order_id: ClientOrderId,
    /// Symbol to trade.
    pub symbol: Symbol,
    /// Order side.
    pub side: OrderSide,
    /// Order type.
    pub order_type: OrderType,
    /// Quantity.
    pub quantity: Decimal,
    /// Limit price (for limit orders).
    pub limit_price: Option<Decimal>,
    /// Stop price (for stop orders).
    pub stop_price: Option<Decimal>,
}

impl PlaceOrderRequest {
    /// Create a market order request.
    #[must_use]
    pub const fn market(
        client_order_id: ClientOrderId,
        symbol: Symbol,
        side: OrderSide,
        quantity: Decimal,
    ) -> Self {
        Self {
            client_order_id,
            symbol,
            side,
            order_type: OrderType::Market,
            quantity,
            limit_price: None,
            stop_price: None,
        }
    }

    /// Create a protective stop order request.
    #[must_use]
    pub const fn stop(
        client_order_id: ClientOrderId,
        symbol: Symbol,
        side: OrderSide,
        quantity: Decimal,
        stop_price: Decimal,
    ) -> Self {
        Self {
            client_order_id,
            symbol,
            side,
            order_type: OrderType::Stop,
            quantity,
            limit_price: None,
            stop_price: Some(stop_price),
        }
    }
}

/// Order as the broker reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerOrder {
    /// Broker-assigned order ID.
    pub broker_order_id: BrokerOrderId,
    /// Client order ID echoed back, when the broker knows it.
    pub client_order_id: Option<ClientOrderId>,
    /// Symbol.
    pub symbol: Symbol,
    /// Side.
    pub side: OrderSide,
    /// Ordered quantity.
    pub quantity: Decimal,
    /// Normalized status.
    pub status: OrderStatus,
    /// Raw status string from the broker.
    pub raw_status: String,
    /// Cumulative filled quantity.
    pub filled_qty: Decimal,
    /// Average fill price, if anything filled.
    pub avg_price: Option<Decimal>,
}

/// Position as the broker reports it. Quantity is signed: negative is short.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerPosition {
    /// Symbol.
    pub symbol: Symbol,
    /// Signed quantity.
    pub quantity: Decimal,
    /// Average entry price.
    pub avg_entry_price: Decimal,
}

/// Broker port error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// Temporary failure (network, 5xx, rate limit) that survived the
    /// adapter's own retries.
    #[error("Broker {operation} failed transiently: {message}")]
    Transient {
        /// Operation that failed.
        operation: &'static str,
        /// Error details.
        message: String,
    },

    /// The broker refused the order.
    #[error("Order rejected by broker: {reason}")]
    Rejected {
        /// Rejection reason.
        reason: String,
    },

    /// Order or symbol not known to the broker.
    #[error("Not found at broker: {id}")]
    NotFound {
        /// The missing ID.
        id: String,
    },

    /// The broker cannot be reached at all.
    #[error("Broker unreachable: {message}")]
    Unreachable {
        /// Error details.
        message: String,
    },
}

impl BrokerError {
    /// Metrics label for the failure class.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Transient { .. } => "transient",
            Self::Rejected { .. } => "rejected",
            Self::NotFound { .. } => "not_found",
            Self::Unreachable { .. } => "unreachable",
        }
    }
}

/// Port for broker interactions.
#[async_trait]
pub trait BrokerPort: Send + Sync {
    /// Place an order for a user.
    async fn place_order(
        &self,
        user_id: &UserId,
        request: PlaceOrderRequest,
    ) -> Result<BrokerOrderId, BrokerError>;

    /// Cancel an order.
    async fn cancel_order(
        &self,
        user_id: &UserId,
        broker_order_id: &BrokerOrderId,
    ) -> Result<(), BrokerError>;

    /// Current status of an order.
    async fn get_order_status(
        &self,
        user_id: &UserId,
        broker_order_id: &BrokerOrderId,
    ) -> Result<BrokerOrder, BrokerError>;

    /// Current top-of-book quote.
    async fn get_quote(&self, symbol: &Symbol) -> Result<Quote, BrokerError>;

    /// Open orders for a user.
    async fn open_orders(&self, user_id: &UserId) -> Result<Vec<BrokerOrder>, BrokerError>;

    /// Open positions for a user.
    async fn open_positions(&self, user_id: &UserId) -> Result<Vec<BrokerPosition>, BrokerError>;
}
