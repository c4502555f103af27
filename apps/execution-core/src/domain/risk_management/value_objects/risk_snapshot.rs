//! Point-in-time inputs for one risk evaluation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order_execution::Quote;
use crate::domain::shared::{Symbol, TradeId};
use crate::domain::supervision::SystemGuardState;

/// An open trade's contribution to portfolio risk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenExposure {
    /// Trade.
    pub trade_id: TradeId,
    /// Symbol.
    pub symbol: Symbol,
    /// Entry-to-stop distance times quantity.
    pub open_risk: Decimal,
    /// Correlation of this symbol with the requested one, if known.
    pub correlation: Option<f64>,
}

/// Everything the gate reads, captured before evaluation starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSnapshot {
    /// System guard flags.
    pub guard: SystemGuardState,
    /// Current account equity.
    pub equity: Decimal,
    /// Realized P&L since the last daily reset.
    pub realized_pnl_today: Decimal,
    /// Open trades.
    pub open_positions: Vec<OpenExposure>,
    /// End of the symbol cooldown, if one is running.
    pub cooldown_until: Option<DateTime<Utc>>,
    /// Current quote for the symbol.
    pub quote: Option<Quote>,
    /// Evaluation time.
    pub now: DateTime<Utc>,
}
