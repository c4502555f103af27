//! Escalation policy for protection failures.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What an unacknowledged protective stop escalates to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureMode {
    /// Enter safe mode (block new entries).
    #[default]
    Safe,
    /// Trigger a global emergency panic.
    Panic,
}

impl fmt::Display for FailureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Safe => write!(f, "SAFE"),
            Self::Panic => write!(f, "PANIC"),
        }
    }
}
