//! System Guard State
//!
//! The supervisory singleton read by the risk gate before every entry.
//! Mutators return whether anything changed so callers can skip duplicate
//! alerts; `version` increments on every change and backs optimistic writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::supervision::value_objects::HaltReason;

/// An active halt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Halt {
    /// Trigger.
    pub reason: HaltReason,
    /// Free-text detail.
    pub detail: String,
    /// When the halt started.
    pub since: DateTime<Utc>,
}

/// Safe-mode and emergency flags plus reconciliation bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemGuardState {
    /// Entry halt. `Some` means safe mode is on.
    pub safe_mode: Option<Halt>,
    /// Global halt. `Some` means emergency mode is on.
    pub emergency: Option<Halt>,
    /// Last reconciliation mismatch summary.
    pub last_mismatch_reason: Option<String>,
    /// When the last mismatch was seen.
    pub last_mismatch_at: Option<DateTime<Utc>>,
    /// When reconciliation last completed.
    pub last_reconciled_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency version.
    pub version: u64,
}

impl SystemGuardState {
    /// Safe mode flag.
    #[must_use]
    pub const fn is_safe_mode(&self) -> bool {
        self.safe_mode.is_some()
    }

    /// Emergency flag.
    #[must_use]
    pub const fn is_emergency(&self) -> bool {
        self.emergency.is_some()
    }

    /// New entries are allowed.
    #[must_use]
    pub const fn allows_entries(&self) -> bool {
        self.safe_mode.is_none() && self.emergency.is_none()
    }

    /// Turn safe mode on. Keeps the first reason if already on.
    pub fn enter_safe_mode(
        &mut self,
        reason: HaltReason,
        detail: impl Into<String>,
        now: DateTime<Utc>,
    ) -> bool {
        if self.safe_mode.is_some() {
            return false;
        }
        self.safe_mode = Some(Halt {
            reason,
            detail: detail.into(),
            since: now,
        });
        self.bump();
        true
    }

    /// Turn safe mode off.
    pub fn clear_safe_mode(&mut self) -> bool {
        if self.safe_mode.take().is_none() {
            return false;
        }
        self.bump();
        true
    }

    /// Turn emergency mode on. Keeps the first reason if already on.
    pub fn enter_emergency(
        &mut self,
        reason: HaltReason,
        detail: impl Into<String>,
        now: DateTime<Utc>,
    ) -> bool {
        if self.emergency.is_some() {
            return false;
        }
        self.emergency = Some(Halt {
            reason,
            detail: detail.into(),
            since: now,
        });
        self.bump();
        true
    }

    /// Turn emergency mode off. Safe mode is left as it is.
    pub fn clear_emergency(&mut self) -> bool {
        if self.emergency.take().is_none() {
            return false;
        }
        self.bump();
        true
    }

    /// Record a reconciliation run and its mismatch summary, if any.
    pub fn record_reconciliation(&mut self, mismatch: Option<String>, now: DateTime<Utc>) {
        self.last_reconciled_at = Some(now);
        if let Some(reason) = mismatch {
            self.last_mismatch_reason = Some(reason);
            self.last_mismatch_at = Some(now);
        }
        self.bump();
    }

    const fn bump(&mut self) {
        self.version += 1;
    }
}
