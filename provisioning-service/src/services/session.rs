//! Session guard - snapshot and restore of the ambient session.
//!
//! Creating an identity account swaps the ambient session to the new
//! account's. The guard captures the operator's session before that window
//! opens and puts it back before anything privileged runs.

use std::sync::Arc;

use crate::models::{AdminSession, SessionSlot};
use crate::services::error::SessionRestoreError;
use crate::services::identity::IdentityProvider;

#[derive(Clone)]
pub struct SessionGuard {
    slot: SessionSlot,
    identity: Arc<dyn IdentityProvider>,
}

impl SessionGuard {
    pub fn new(slot: SessionSlot, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { slot, identity }
    }

    /// Capture the current ambient session without side effects.
    pub async fn snapshot(&self) -> Option<AdminSession> {
        self.slot.read().await.clone()
    }

    /// Re-establish the ambient session from a snapshot by exchanging its
    /// refresh credential. A failure here is higher-severity than ordinary
    /// request errors: mid-workflow it leaves the operator without their
    /// own privileges.
    pub async fn restore(&self, snapshot: &AdminSession) -> Result<(), SessionRestoreError> {
        match self.identity.refresh_session(&snapshot.refresh_token).await {
            Ok(session) => {
                tracing::info!(
                    identity_id = %session.identity_id,
                    "Operator session restored"
                );
                *self.slot.write().await = Some(session);
                Ok(())
            }
            Err(err) => {
                tracing::error!(
                    identity_id = %snapshot.identity_id,
                    error = %err,
                    "Failed to restore operator session, ambient session is NOT the operator's"
                );
                Err(err)
            }
        }
    }

    /// Whether the ambient session still belongs to the snapshot's owner.
    /// Used to re-verify session state after an ambiguous provider failure.
    pub async fn current_matches(&self, snapshot: &AdminSession) -> bool {
        self.slot
            .read()
            .await
            .as_ref()
            .is_some_and(|current| current.belongs_to(snapshot.identity_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{new_session_slot, IdentityId};
    use crate::services::identity::MockIdentityProvider;
    use chrono::{Duration, Utc};

    fn operator_session() -> AdminSession {
        AdminSession {
            access_token: "op-access".to_string(),
            refresh_token: "op-refresh".to_string(),
            identity_id: IdentityId::new(),
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn test_snapshot_is_none_when_unauthenticated() {
        let slot = new_session_slot();
        let identity = Arc::new(MockIdentityProvider::new(slot.clone(), operator_session()));
        let guard = SessionGuard::new(slot, identity);
        assert!(guard.snapshot().await.is_none());
    }

    #[tokio::test]
    async fn test_restore_writes_operator_session_back() {
        let slot = new_session_slot();
        let operator = operator_session();
        let identity = Arc::new(MockIdentityProvider::new(slot.clone(), operator.clone()));
        let guard = SessionGuard::new(slot.clone(), identity);

        // Simulate the signup side effect: slot holds another account.
        let intruder = AdminSession {
            access_token: "acct-access".to_string(),
            refresh_token: "acct-refresh".to_string(),
            identity_id: IdentityId::new(),
            expires_at: Utc::now() + Duration::hours(1),
        };
        *slot.write().await = Some(intruder);

        guard.restore(&operator).await.unwrap();

        let current = slot.read().await.clone().unwrap();
        assert_eq!(current.identity_id, operator.identity_id);
        assert_eq!(current.access_token, operator.access_token);
    }

    #[tokio::test]
    async fn test_restore_failure_leaves_slot_untouched() {
        let slot = new_session_slot();
        let operator = operator_session();
        let identity = Arc::new(MockIdentityProvider::new(slot.clone(), operator.clone()));
        identity.reject_refresh();
        let guard = SessionGuard::new(slot.clone(), identity);

        let intruder = AdminSession {
            access_token: "acct-access".to_string(),
            refresh_token: "acct-refresh".to_string(),
            identity_id: IdentityId::new(),
            expires_at: Utc::now() + Duration::hours(1),
        };
        *slot.write().await = Some(intruder.clone());

        let err = guard.restore(&operator).await.unwrap_err();
        assert!(matches!(err, SessionRestoreError::RefreshRejected(_)));

        let current = slot.read().await.clone().unwrap();
        assert_eq!(current.access_token, intruder.access_token);
    }

    #[tokio::test]
    async fn test_current_matches_tracks_owner() {
        let slot = new_session_slot();
        let operator = operator_session();
        let identity = Arc::new(MockIdentityProvider::new(slot.clone(), operator.clone()));
        let guard = SessionGuard::new(slot.clone(), identity);

        assert!(!guard.current_matches(&operator).await);
        *slot.write().await = Some(operator.clone());
        assert!(guard.current_matches(&operator).await);
    }
}
