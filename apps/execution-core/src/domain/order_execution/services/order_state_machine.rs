//! Order State Machine Service
//!
//! Legal edges of the order intent lifecycle.

use crate::domain::order_execution::value_objects::OrderStatus;
use crate::domain::shared::{LifecycleState, StateMachineError, check_transition};

impl LifecycleState for OrderStatus {
    const ENTITY: &'static str = "order_intent";

    fn successors(self) -> &'static [Self] {
        match self {
            Self::Created => &[Self::Sent, Self::Rejected, Self::Unknown],
            Self::Sent => &[Self::Acked, Self::Rejected, Self::Cancelled, Self::Unknown],
            Self::Acked => &[
                Self::PartiallyFilled,
                Self::Filled,
                Self::Rejected,
                Self::Cancelled,
                Self::Unknown,
            ],
            Self::PartiallyFilled => &[Self::Filled, Self::Cancelled, Self::Unknown],
            // Late resolution of an order the broker stopped reporting.
            Self::Unknown => &[Self::Filled, Self::Cancelled, Self::Rejected],
            Self::Filled | Self::Rejected | Self::Cancelled => &[],
        }
    }

    fn is_terminal(self) -> bool {
        OrderStatus::is_terminal(&self)
    }
}

/// Order State Machine for validating transitions.
pub struct OrderStateMachine;

impl OrderStateMachine {
    /// Check if a state transition is valid.
    #[must_use]
    pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
        from != to && from.can_transition_to(to)
    }

    /// Validate a state transition for the intent `id`.
    ///
    /// # Errors
    ///
    /// Returns error for no-op or undeclared transitions.
    pub fn validate_transition(
        id: &str,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<(), StateMachineError> {
        check_transition(id, from, to)
    }

    /// Statuses the intent must pass through to get from `from` to `to`,
    /// excluding `from` and including `to`. Empty when `to` is unreachable.
    #[must_use]
    pub fn path(from: OrderStatus, to: OrderStatus) -> Vec<OrderStatus> {
        use std::collections::{HashMap, VecDeque};

        let mut parents: HashMap<OrderStatus, OrderStatus> = HashMap::new();
        let mut queue = VecDeque::from([from]);
        while let Some(state) = queue.pop_front() {
            if state == to {
                break;
            }
            for &next in state.successors() {
                if next != from && !parents.contains_key(&next) {
                    parents.insert(next, state);
                    queue.push_back(next);
                }
            }
        }

        let mut path = Vec::new();
        let mut cursor = to;
        while let Some(&parent) = parents.get(&cursor) {
            path.push(cursor);
            cursor = parent;
        }
        if cursor != from {
            return Vec::new();
        }
        path.reverse();
        path
    }
}
