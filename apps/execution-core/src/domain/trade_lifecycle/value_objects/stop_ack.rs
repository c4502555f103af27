//! Protective stop acknowledgement state.

use serde::{Deserialize, Serialize};

/// Whether the broker confirmed the protective stop order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopAck {
    /// Not yet confirmed.
    #[default]
    Pending,
    /// Broker confirmed the order.
    Acknowledged,
    /// Placement failed.
    Failed,
}
