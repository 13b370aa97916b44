//! Ambient session model.
//!
//! The identity provider issues one session per process ("currently
//! authenticated as"), and its account-creation call replaces that session
//! with the new account's as a documented side effect. The session therefore
//! lives in a single shared slot that every collaborator reads from and that
//! only the identity client and the session guard write to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Identifier of an account in the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(transparent)]
pub struct IdentityId(pub Uuid);

impl IdentityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for IdentityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for IdentityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for IdentityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// An authenticated session with the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminSession {
    pub access_token: String,
    pub refresh_token: String,
    pub identity_id: IdentityId,
    pub expires_at: DateTime<Utc>,
}

impl AdminSession {
    /// Whether this session belongs to the given identity.
    pub fn belongs_to(&self, identity_id: IdentityId) -> bool {
        self.identity_id == identity_id
    }
}

/// The process-wide ambient session slot.
///
/// `None` means unauthenticated. Callers must treat the slot as a single
/// shared resource: the provisioning workflow serializes around it.
pub type SessionSlot = Arc<RwLock<Option<AdminSession>>>;

/// Create an empty ambient session slot.
pub fn new_session_slot() -> SessionSlot {
    Arc::new(RwLock::new(None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_belongs_to() {
        let id = IdentityId::new();
        let session = AdminSession {
            access_token: "at".to_string(),
            refresh_token: "rt".to_string(),
            identity_id: id,
            expires_at: Utc::now(),
        };
        assert!(session.belongs_to(id));
        assert!(!session.belongs_to(IdentityId::new()));
    }

    #[test]
    fn test_identity_id_round_trips_through_display() {
        let id = IdentityId::new();
        let parsed: IdentityId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
