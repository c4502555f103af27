//! Symbol Cooldown Tracker
//!
//! Remembers when each (user, symbol) last exited so the risk gate can block
//! immediate re-entry. In-process and advisory; no cross-process consistency.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use crate::domain::shared::{Symbol, UserId};

/// Last exit time per (user, symbol).
#[derive(Debug, Default)]
pub struct CooldownTracker {
    exits: RwLock<HashMap<(UserId, Symbol), DateTime<Utc>>>,
}

impl CooldownTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an exit. Keeps the latest time if exits arrive out of order.
    pub fn record_exit(&self, user_id: &UserId, symbol: &Symbol, at: DateTime<Utc>) {
        let mut exits = self.exits.write();
        let entry = exits.entry((user_id.clone(), symbol.clone())).or_insert(at);
        if at > *entry {
            *entry = at;
        }
    }

    /// End of the cooldown window, if one is running at `now`.
    pub fn cooldown_until(
        &self,
        user_id: &UserId,
        symbol: &Symbol,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let exits = self.exits.read();
        let last = exits.get(&(user_id.clone(), symbol.clone()))?;
        let until = *last + window;
        (until > now).then_some(until)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_runs_from_last_exit() {
        let tracker = CooldownTracker::new();
        let user = UserId::new("u-1");
        let symbol = Symbol::new("AAPL");
        let t0 = Utc::now();

        tracker.record_exit(&user, &symbol, t0);
        let window = Duration::minutes(30);

        assert_eq!(
            tracker.cooldown_until(&user, &symbol, window, t0 + Duration::minutes(10)),
            Some(t0 + window)
        );
        assert_eq!(
            tracker.cooldown_until(&user, &symbol, window, t0 + Duration::minutes(31)),
            None
        );
    }

    #[test]
    fn keyed_by_user_and_symbol() {
        let tracker = CooldownTracker::new();
        let t0 = Utc::now();
        tracker.record_exit(&UserId::new("u-1"), &Symbol::new("AAPL"), t0);

        let window = Duration::minutes(30);
        assert!(tracker
            .cooldown_until(&UserId::new("u-2"), &Symbol::new("AAPL"), window, t0)
            .is_none());
        assert!(tracker
            .cooldown_until(&UserId::new("u-1"), &Symbol::new("MSFT"), window, t0)
            .is_none());
    }

    #[test]
    fn late_out_of_order_exit_does_not_shorten() {
        let tracker = CooldownTracker::new();
        let user = UserId::new("u-1");
        let symbol = Symbol::new("AAPL");
        let t0 = Utc::now();

        tracker.record_exit(&user, &symbol, t0);
        tracker.record_exit(&user, &symbol, t0 - Duration::minutes(20));

        let until = tracker.cooldown_until(&user, &symbol, Duration::minutes(30), t0);
        assert_eq!(until, Some(t0 + Duration::minutes(30)));
    }
}
