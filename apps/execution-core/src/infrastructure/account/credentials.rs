//! Broker credential registry.
//!
//! Holds only whether a user's live credentials are active; secrets stay
//! with the broker adapter's own configuration.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::warn;

use crate::application::ports::{CredentialStore, PortError};
use crate::domain::shared::UserId;

/// In-memory credential registry.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    active: RwLock<BTreeMap<UserId, bool>>,
}

impl InMemoryCredentialStore {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or re-activate a user's live credentials.
    pub fn activate(&self, user_id: UserId) {
        self.active.write().insert(user_id, true);
    }

    /// Revoke one user's credentials. Returns whether they were active.
    pub fn revoke(&self, user_id: &UserId) -> bool {
        self.active
            .write()
            .get_mut(user_id)
            .is_some_and(|active| std::mem::replace(active, false))
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn active_users(&self) -> Result<Vec<UserId>, PortError> {
        Ok(self
            .active
            .read()
            .iter()
            .filter(|(_, active)| **active)
            .map(|(user, _)| user.clone())
            .collect())
    }

    async fn has_active_credentials(&self, user_id: &UserId) -> Result<bool, PortError> {
        Ok(self.active.read().get(user_id).copied().unwrap_or(false))
    }

    async fn revoke_all(&self) -> Result<usize, PortError> {
        let mut active = self.active.write();
        let mut revoked = 0;
        for flag in active.values_mut() {
            if std::mem::replace(flag, false) {
                revoked += 1;
            }
        }
        warn!(revoked, "All broker credentials revoked");
        Ok(revoked)
    }
}
