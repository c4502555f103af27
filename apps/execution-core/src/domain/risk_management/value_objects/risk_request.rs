//! Input to the risk gate.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order_execution::{OrderPurpose, OrderSide};
use crate::domain::shared::{Symbol, UserId};

/// A proposed order, as seen by the risk gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskRequest {
    /// Owner.
    pub user_id: UserId,
    /// Symbol.
    pub symbol: Symbol,
    /// Side.
    pub side: OrderSide,
    /// Quantity.
    pub quantity: Decimal,
    /// Entry or exit.
    pub purpose: OrderPurpose,
    /// Intended entry price; the quote is used when absent.
    pub entry_price: Option<Decimal>,
    /// Protective stop for entries.
    pub stop_price: Option<Decimal>,
}

impl RiskRequest {
    /// Entries run every check; everything else only liquidity.
    #[must_use]
    pub const fn is_entry(&self) -> bool {
        self.purpose.is_entry()
    }
}
