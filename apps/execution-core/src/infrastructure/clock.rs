//! Clock adapters.
//!
//! `SystemClock` reads wall time and sleeps on the tokio timer.
//! `ManualClock` only moves when told to; its `sleep` advances the clock by
//! the requested duration and returns at once, so polling loops and backoff
//! schedules run instantly in tests.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use crate::application::ports::Clock;

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Hand-driven clock for tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    /// Starts at 2024-01-02 14:30 UTC, a weekday during US market hours.
    fn default() -> Self {
        let start = Utc
            .with_ymd_and_hms(2024, 1, 2, 14, 30, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self::at(start)
    }
}

impl ManualClock {
    /// Create a clock reading `now`.
    #[must_use]
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: chrono::Duration) {
        *self.now.lock() += by;
    }

    /// Jump to a point in time.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    async fn sleep(&self, duration: Duration) {
        let step = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX);
        self.advance(step);
        tokio::task::yield_now().await;
    }
}
