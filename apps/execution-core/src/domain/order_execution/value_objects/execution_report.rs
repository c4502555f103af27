//! Caller-facing projection of an order intent.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::OrderStatus;
use crate::domain::shared::{BrokerOrderId, ClientOrderId};

/// Result of an execution request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Client key of the intent.
    pub client_order_id: ClientOrderId,
    /// Broker id, once acknowledged.
    pub broker_order_id: Option<BrokerOrderId>,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Quantity filled so far.
    pub filled_qty: Decimal,
    /// Average fill price.
    pub avg_price: Option<Decimal>,
    /// Why the order was rejected, if it was.
    pub rejection_reason: Option<String>,
}

impl ExecutionReport {
    /// Returns true when the whole quantity filled.
    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled
    }
}
