//! Per-user realized loss counters.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Consecutive-loss streak and realized P&L per calendar period (UTC).
///
/// Weekly and monthly totals roll over on their own when a result lands in a
/// new ISO week or month. The daily total and the streak only reset through
/// [`LossCounters::reset_daily`]. `version` increments on every change and
/// backs optimistic writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LossCounters {
    /// Losing trades in a row.
    pub consecutive_losses: u32,
    /// Realized P&L since the last daily reset.
    pub daily_pnl: Decimal,
    /// Realized P&L this ISO week.
    pub weekly_pnl: Decimal,
    /// Realized P&L this month.
    pub monthly_pnl: Decimal,
    /// Day of the last daily reset.
    pub day: NaiveDate,
    /// ISO (year, week) the weekly total belongs to.
    pub week: (i32, u32),
    /// (year, month) the monthly total belongs to.
    pub month: (i32, u32),
    /// Optimistic concurrency version; 0 until first stored.
    #[serde(default)]
    pub version: u64,
}

impl LossCounters {
    /// Fresh counters anchored at `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        let date = now.date_naive();
        Self {
            consecutive_losses: 0,
            daily_pnl: Decimal::ZERO,
            weekly_pnl: Decimal::ZERO,
            monthly_pnl: Decimal::ZERO,
            day: date,
            week: iso_week(date),
            month: (date.year(), date.month()),
            version: 0,
        }
    }

    /// Add one closed trade's realized P&L.
    pub fn record(&mut self, pnl: Decimal, now: DateTime<Utc>) {
        self.roll_over(now);

        self.daily_pnl += pnl;
        self.weekly_pnl += pnl;
        self.monthly_pnl += pnl;
        if pnl < Decimal::ZERO {
            self.consecutive_losses += 1;
        } else {
            self.consecutive_losses = 0;
        }
        self.version += 1;
    }

    /// Clear the daily total and the loss streak.
    pub fn reset_daily(&mut self, now: DateTime<Utc>) {
        self.roll_over(now);
        self.daily_pnl = Decimal::ZERO;
        self.consecutive_losses = 0;
        self.day = now.date_naive();
        self.version += 1;
    }

    /// Start new weekly or monthly totals if `now` is in a later period.
    pub fn roll_over(&mut self, now: DateTime<Utc>) {
        let date = now.date_naive();
        let week = iso_week(date);
        if week != self.week {
            self.week = week;
            self.weekly_pnl = Decimal::ZERO;
        }
        let month = (date.year(), date.month());
        if month != self.month {
            self.month = month;
            self.monthly_pnl = Decimal::ZERO;
        }
    }
}

fn iso_week(date: NaiveDate) -> (i32, u32) {
    let week = date.iso_week();
    (week.year(), week.week())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 15, 0, 0).unwrap()
    }

    #[test]
    fn streak_counts_losses_and_resets_on_win() {
        let mut c = LossCounters::new(at(2026, 3, 2));
        c.record(dec!(-100), at(2026, 3, 2));
        c.record(dec!(-50), at(2026, 3, 2));
        assert_eq!(c.consecutive_losses, 2);
        assert_eq!(c.daily_pnl, dec!(-150));

        c.record(dec!(20), at(2026, 3, 2));
        assert_eq!(c.consecutive_losses, 0);
        assert_eq!(c.daily_pnl, dec!(-130));
    }

    #[test]
    fn weekly_rolls_over_on_new_iso_week() {
        // 2026-03-06 is a Friday, 2026-03-09 the next Monday.
        let mut c = LossCounters::new(at(2026, 3, 6));
        c.record(dec!(-100), at(2026, 3, 6));
        c.record(dec!(-10), at(2026, 3, 9));

        assert_eq!(c.weekly_pnl, dec!(-10));
        assert_eq!(c.monthly_pnl, dec!(-110));
        // Daily only resets explicitly.
        assert_eq!(c.daily_pnl, dec!(-110));
    }

    #[test]
    fn daily_reset_keeps_weekly() {
        let mut c = LossCounters::new(at(2026, 3, 3));
        c.record(dec!(-100), at(2026, 3, 3));
        c.reset_daily(at(2026, 3, 4));

        assert_eq!(c.daily_pnl, Decimal::ZERO);
        assert_eq!(c.consecutive_losses, 0);
        assert_eq!(c.weekly_pnl, dec!(-100));
        assert_eq!(c.day, at(2026, 3, 4).date_naive());
    }
}
