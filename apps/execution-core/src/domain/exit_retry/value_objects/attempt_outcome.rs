//! Typed exit attempt results and the pure retry decision.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::BackoffPolicy;

/// What one exit attempt produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptOutcome {
    /// The exit filled.
    Filled {
        /// Average fill price.
        price: Decimal,
    },
    /// The exit did not fill but may on a later attempt.
    Retryable(String),
    /// The exit can never succeed (trade gone, nothing to sell).
    Fatal(String),
}

/// What the coordinator does next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Close the trade and resolve the request.
    Resolve {
        /// Exit fill price.
        price: Decimal,
    },
    /// Try again at `at`.
    Retry {
        /// Next attempt time.
        at: DateTime<Utc>,
        /// Why this attempt failed.
        error: String,
    },
    /// Stop retrying and escalate.
    DeadLetter {
        /// Why the request was given up on.
        error: String,
    },
}

/// Decide the next step after attempt number `attempts` (1-based).
#[must_use]
pub fn decide(
    outcome: AttemptOutcome,
    attempts: u32,
    policy: &BackoffPolicy,
    now: DateTime<Utc>,
) -> RetryDecision {
    match outcome {
        AttemptOutcome::Filled { price } => RetryDecision::Resolve { price },
        AttemptOutcome::Fatal(error) => RetryDecision::DeadLetter { error },
        AttemptOutcome::Retryable(error) if policy.is_exhausted(attempts) => {
            RetryDecision::DeadLetter {
                error: format!("{error} (after {attempts} attempts)"),
            }
        }
        AttemptOutcome::Retryable(error) => {
            let delay = chrono::Duration::from_std(policy.delay_for(attempts))
                .unwrap_or(chrono::Duration::MAX);
            RetryDecision::Retry {
                at: now.checked_add_signed(delay).unwrap_or(now),
                error,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn policy() -> BackoffPolicy {
        BackoffPolicy::new(3, Duration::from_secs(2), Duration::from_secs(60))
    }

    #[test]
    fn filled_resolves() {
        let decision = decide(
            AttemptOutcome::Filled { price: dec!(101) },
            1,
            &policy(),
            Utc::now(),
        );
        assert_eq!(decision, RetryDecision::Resolve { price: dec!(101) });
    }

    #[test]
    fn retryable_backs_off() {
        let now = Utc::now();
        let decision = decide(AttemptOutcome::Retryable("timeout".into()), 2, &policy(), now);
        assert_eq!(
            decision,
            RetryDecision::Retry {
                at: now + chrono::Duration::seconds(4),
                error: "timeout".into()
            }
        );
    }

    #[test]
    fn retryable_at_ceiling_dead_letters() {
        let decision = decide(AttemptOutcome::Retryable("rejected".into()), 3, &policy(), Utc::now());
        assert!(matches!(decision, RetryDecision::DeadLetter { .. }));
    }

    #[test]
    fn fatal_dead_letters_immediately() {
        let decision = decide(AttemptOutcome::Fatal("trade missing".into()), 1, &policy(), Utc::now());
        assert_eq!(
            decision,
            RetryDecision::DeadLetter {
                error: "trade missing".into()
            }
        );
    }
}
