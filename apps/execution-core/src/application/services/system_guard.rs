//! System Guard Service
//!
//! The only writer of the system guard singleton. Every change is a
//! read-modify-write against the stored version; a lost race re-reads and
//! re-applies the change. Changes are broadcast, audited and mirrored into
//! the safe-mode / emergency gauges.

use std::sync::Arc;

use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::ports::{
    AuditEvent, AuditSink, Clock, Notification, NotificationKind, NotificationPort, PortError,
};
use crate::domain::shared::RepositoryError;
use crate::domain::supervision::{HaltReason, SystemGuardRepository, SystemGuardState};
use crate::observability::{record_halt, set_emergency_mode, set_safe_mode};

/// Attempts before a contended update gives up.
const MAX_UPDATE_ATTEMPTS: u32 = 8;

/// Errors from guard updates.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Storage failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Capital or credential lookup failure.
    #[error(transparent)]
    Port(#[from] PortError),

    /// Too many concurrent writers.
    #[error("{what} update lost {attempts} races in a row")]
    Contended {
        /// Record being written.
        what: &'static str,
        /// Attempts made.
        attempts: u32,
    },
}

/// Result of one guard update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardUpdate {
    /// Whether the mutation changed anything.
    pub changed: bool,
    /// State after the update.
    pub state: SystemGuardState,
}

/// Owner of the system guard singleton.
pub struct SystemGuardService {
    repo: Arc<dyn SystemGuardRepository>,
    notifier: Arc<dyn NotificationPort>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl SystemGuardService {
    /// Create the service.
    pub fn new(
        repo: Arc<dyn SystemGuardRepository>,
        notifier: Arc<dyn NotificationPort>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo,
            notifier,
            audit,
            clock,
        }
    }

    /// Current state.
    pub async fn snapshot(&self) -> Result<SystemGuardState, SupervisorError> {
        Ok(self.repo.load().await?)
    }

    /// Apply `mutate` with optimistic retries. `mutate` returns whether it
    /// changed anything; unchanged states are not written.
    pub async fn update<F>(&self, mut mutate: F) -> Result<GuardUpdate, SupervisorError>
    where
        F: FnMut(&mut SystemGuardState) -> bool + Send,
    {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let mut state = self.repo.load().await?;
            let expected = state.version;
            if !mutate(&mut state) {
                return Ok(GuardUpdate {
                    changed: false,
                    state,
                });
            }
            match self.repo.store(&state, expected).await {
                Ok(()) => {
                    set_safe_mode(state.is_safe_mode());
                    set_emergency_mode(state.is_emergency());
                    return Ok(GuardUpdate {
                        changed: true,
                        state,
                    });
                }
                Err(e) if e.is_conflict() => {
                    warn!(expected_version = expected, "System guard write lost a race, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(SupervisorError::Contended {
            what: "System guard",
            attempts: MAX_UPDATE_ATTEMPTS,
        })
    }

    /// Turn safe mode on. Returns whether it was newly set.
    pub async fn enter_safe_mode(
        &self,
        reason: HaltReason,
        detail: impl Into<String>,
    ) -> Result<bool, SupervisorError> {
        let detail = detail.into();
        let now = self.clock.now();
        let update = self
            .update(|s| s.enter_safe_mode(reason, detail.clone(), now))
            .await?;
        if update.changed {
            warn!(reason = %reason, %detail, "Safe mode engaged, new entries blocked");
            record_halt(reason.code());
            self.announce("safe_mode_on", format!("Safe mode on: {reason} ({detail})"), reason)
                .await;
        }
        Ok(update.changed)
    }

    /// Turn safe mode off (operator clearance).
    pub async fn clear_safe_mode(&self, operator: &str) -> Result<bool, SupervisorError> {
        let update = self.update(SystemGuardState::clear_safe_mode).await?;
        if update.changed {
            info!(%operator, "Safe mode cleared");
            self.announce_clear("safe_mode_off", format!("Safe mode cleared by {operator}"))
                .await;
        }
        Ok(update.changed)
    }

    /// Lift safe mode only if it was set for a reason the daily reset owns.
    pub async fn clear_daily_halt(&self) -> Result<bool, SupervisorError> {
        let update = self
            .update(|s| {
                let resettable = s
                    .safe_mode
                    .as_ref()
                    .is_some_and(|halt| halt.reason.clears_on_daily_reset());
                resettable && s.clear_safe_mode()
            })
            .await?;
        if update.changed {
            info!("Daily reset lifted safe mode");
            self.announce_clear("safe_mode_off", "Safe mode lifted by daily reset".to_string())
                .await;
        }
        Ok(update.changed)
    }

    /// Turn emergency mode on. Returns whether it was newly set.
    pub async fn enter_emergency(
        &self,
        reason: HaltReason,
        detail: impl Into<String>,
    ) -> Result<bool, SupervisorError> {
        let detail = detail.into();
        let now = self.clock.now();
        let update = self
            .update(|s| s.enter_emergency(reason, detail.clone(), now))
            .await?;
        if update.changed {
            warn!(reason = %reason, %detail, "Emergency mode engaged");
            record_halt(reason.code());
            self.announce("emergency_on", format!("Emergency mode on: {reason} ({detail})"), reason)
                .await;
        }
        Ok(update.changed)
    }

    /// Turn emergency mode off (operator clearance).
    pub async fn clear_emergency(&self, operator: &str) -> Result<bool, SupervisorError> {
        let update = self.update(SystemGuardState::clear_emergency).await?;
        if update.changed {
            info!(%operator, "Emergency mode cleared");
            self.announce_clear("emergency_off", format!("Emergency mode cleared by {operator}"))
                .await;
        }
        Ok(update.changed)
    }

    /// Record a finished reconciliation run.
    pub async fn record_reconciliation(
        &self,
        mismatch: Option<String>,
    ) -> Result<SystemGuardState, SupervisorError> {
        let now = self.clock.now();
        let update = self
            .update(|s| {
                s.record_reconciliation(mismatch.clone(), now);
                true
            })
            .await?;
        Ok(update.state)
    }

    async fn announce(&self, action: &str, message: String, reason: HaltReason) {
        let now = self.clock.now();
        let payload = json!({ "reason": reason.code() });
        self.audit
            .record_best_effort(
                AuditEvent::new("supervisor", action, message.clone(), now)
                    .with_metadata(payload.clone()),
            )
            .await;
        self.notifier
            .publish_best_effort(
                Notification::new(NotificationKind::Status, message, now).with_payload(payload),
            )
            .await;
    }

    async fn announce_clear(&self, action: &str, message: String) {
        let now = self.clock.now();
        self.audit
            .record_best_effort(AuditEvent::new("supervisor", action, message.clone(), now))
            .await;
        self.notifier
            .publish_best_effort(Notification::new(NotificationKind::Status, message, now))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::notify::{BroadcastNotifier, InMemoryAuditLog};
    use crate::infrastructure::persistence::InMemorySystemGuardRepository;

    fn service() -> (SystemGuardService, Arc<InMemoryAuditLog>) {
        let audit = Arc::new(InMemoryAuditLog::new());
        let service = SystemGuardService::new(
            Arc::new(InMemorySystemGuardRepository::new()),
            Arc::new(BroadcastNotifier::new(16)),
            audit.clone(),
            Arc::new(ManualClock::default()),
        );
        (service, audit)
    }

    #[tokio::test]
    async fn safe_mode_is_set_once_and_audited() {
        let (service, audit) = service();

        assert!(service.enter_safe_mode(HaltReason::StopLossFailure, "t-1").await.unwrap());
        assert!(!service.enter_safe_mode(HaltReason::Manual, "again").await.unwrap());

        let state = service.snapshot().await.unwrap();
        assert_eq!(state.safe_mode.unwrap().reason, HaltReason::StopLossFailure);
        assert_eq!(audit.events_with_action("safe_mode_on").len(), 1);
    }

    #[tokio::test]
    async fn daily_reset_only_lifts_loss_halts() {
        let (service, _) = service();
        service.enter_safe_mode(HaltReason::ReconciliationMismatch, "ghost").await.unwrap();
        assert!(!service.clear_daily_halt().await.unwrap());

        service.clear_safe_mode("ops").await.unwrap();
        service.enter_safe_mode(HaltReason::DailyLossLimit, "-3%").await.unwrap();
        assert!(service.clear_daily_halt().await.unwrap());
        assert!(service.snapshot().await.unwrap().allows_entries());
    }

    #[tokio::test]
    async fn concurrent_updates_all_land() {
        let (service, _) = service();
        let service = Arc::new(service);

        let mut handles = Vec::new();
        for i in 0..4 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service.record_reconciliation(Some(format!("run {i}"))).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(service.snapshot().await.unwrap().version, 4);
    }
}
