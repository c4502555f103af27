//! Legal edges of the trade position lifecycle.

use crate::domain::shared::LifecycleState;
use crate::domain::trade_lifecycle::value_objects::PositionState;

impl LifecycleState for PositionState {
    const ENTITY: &'static str = "trade";

    fn successors(self) -> &'static [Self] {
        match self {
            Self::Opening => &[Self::Open, Self::Closing, Self::Error],
            Self::Open => &[Self::Closing, Self::Error],
            Self::Closing => &[Self::Closed],
            Self::Error => &[Self::Closing],
            Self::Closed => &[],
        }
    }
}
