//! Directory store client.
//!
//! The only write path into the directory is a privileged, server-enforced
//! procedure keyed on the caller's ambient session; this client never writes
//! tables directly, so the store's own access checks stay the binding
//! authority.

use reqwest::StatusCode;
use service_core::async_trait::async_trait;

use crate::models::{DirectoryProfile, DirectoryRecord, IdentityId, Role, SessionSlot};
use crate::services::error::DirectoryError;

#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Insert the profile/role record for a created identity via the
    /// privileged procedure. Requires an ambient session with operator
    /// privilege.
    async fn insert_account(
        &self,
        identity_id: IdentityId,
        profile: &DirectoryProfile,
        role_id: i32,
    ) -> Result<DirectoryRecord, DirectoryError>;

    /// Look up the record bound to an identity id, if any.
    async fn find_by_identity(
        &self,
        identity_id: IdentityId,
    ) -> Result<Option<DirectoryRecord>, DirectoryError>;

    /// Fetch the read-only role catalog.
    async fn list_roles(&self) -> Result<Vec<Role>, DirectoryError>;
}

/// HTTP client for the directory store's REST surface.
#[derive(Clone)]
pub struct HttpDirectoryStore {
    http: reqwest::Client,
    base_url: String,
    slot: SessionSlot,
}

impl HttpDirectoryStore {
    pub fn new(http: reqwest::Client, base_url: &str, slot: SessionSlot) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            slot,
        }
    }

    /// Read the ambient access token. The privileged procedure authorizes
    /// whatever session this token carries, which is exactly why the
    /// orchestrator restores the operator session before calling in.
    async fn bearer_token(&self) -> Result<String, DirectoryError> {
        match self.slot.read().await.as_ref() {
            Some(session) => Ok(session.access_token.clone()),
            None => Err(DirectoryError::Authorization),
        }
    }
}

#[async_trait]
impl DirectoryStore for HttpDirectoryStore {
    async fn insert_account(
        &self,
        identity_id: IdentityId,
        profile: &DirectoryProfile,
        role_id: i32,
    ) -> Result<DirectoryRecord, DirectoryError> {
        let token = self.bearer_token().await?;

        let res = self
            .http
            .post(format!(
                "{}/rpc/provision_directory_account",
                self.base_url
            ))
            .bearer_auth(token)
            .json(&serde_json::json!({
                "identity_id": identity_id,
                "given_name": profile.given_name,
                "family_name": profile.family_name,
                "email": profile.email,
                "role_id": role_id,
            }))
            .send()
            .await
            .map_err(classify_transport_failure)?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(classify_directory_failure(status, &body));
        }

        let record: DirectoryRecord = res.json().await.map_err(|e| {
            DirectoryError::Transient(format!("malformed directory response: {}", e))
        })?;

        tracing::info!(
            identity_id = %identity_id,
            record_id = record.id,
            role_id,
            "Directory record inserted"
        );

        Ok(record)
    }

    async fn find_by_identity(
        &self,
        identity_id: IdentityId,
    ) -> Result<Option<DirectoryRecord>, DirectoryError> {
        let token = self.bearer_token().await?;

        let res = self
            .http
            .get(format!(
                "{}/directory_accounts?identity_id=eq.{}",
                self.base_url, identity_id
            ))
            .bearer_auth(token)
            .send()
            .await
            .map_err(classify_transport_failure)?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(classify_directory_failure(status, &body));
        }

        let mut records: Vec<DirectoryRecord> = res.json().await.map_err(|e| {
            DirectoryError::Transient(format!("malformed directory response: {}", e))
        })?;

        Ok(records.pop())
    }

    async fn list_roles(&self) -> Result<Vec<Role>, DirectoryError> {
        let token = self.bearer_token().await?;

        let res = self
            .http
            .get(format!("{}/roles", self.base_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(classify_transport_failure)?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(classify_directory_failure(status, &body));
        }

        res.json()
            .await
            .map_err(|e| DirectoryError::Transient(format!("malformed roles response: {}", e)))
    }
}

fn classify_transport_failure(err: reqwest::Error) -> DirectoryError {
    if err.is_timeout() {
        // Ambiguous: the procedure may or may not have committed.
        DirectoryError::Timeout
    } else {
        DirectoryError::Transient(err.to_string())
    }
}

fn classify_directory_failure(status: StatusCode, body: &str) -> DirectoryError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DirectoryError::Authorization,
        StatusCode::CONFLICT => DirectoryError::Conflict,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            DirectoryError::Validation(body.trim().chars().take(200).collect())
        }
        StatusCode::GATEWAY_TIMEOUT => DirectoryError::Timeout,
        _ => DirectoryError::Transient(format!("directory returned {}", status)),
    }
}

/// In-memory directory store for tests and local development.
///
/// Enforces the privileged procedure's checks the way the real store does:
/// the caller's ambient access token must be the operator's, the role must
/// exist, and a second insert for the same identity is a conflict, not a
/// second record.
pub struct MockDirectoryStore {
    slot: SessionSlot,
    operator_access_token: String,
    roles: Vec<Role>,
    records: std::sync::Mutex<Vec<DirectoryRecord>>,
    next_id: std::sync::atomic::AtomicI64,
    fail_next_insert: std::sync::Mutex<Option<DirectoryError>>,
    fail_next_find: std::sync::Mutex<Option<DirectoryError>>,
    insert_delay: std::sync::Mutex<Option<std::time::Duration>>,
    journal: crate::services::CallJournal,
}

impl MockDirectoryStore {
    pub fn new(slot: SessionSlot, operator_access_token: &str, roles: Vec<Role>) -> Self {
        Self {
            slot,
            operator_access_token: operator_access_token.to_string(),
            roles,
            records: std::sync::Mutex::new(Vec::new()),
            next_id: std::sync::atomic::AtomicI64::new(1),
            fail_next_insert: std::sync::Mutex::new(None),
            fail_next_find: std::sync::Mutex::new(None),
            insert_delay: std::sync::Mutex::new(None),
            journal: crate::services::CallJournal::default(),
        }
    }

    pub fn with_journal(mut self, journal: crate::services::CallJournal) -> Self {
        self.journal = journal;
        self
    }

    pub fn fail_next_insert(&self, err: DirectoryError) {
        *self.fail_next_insert.lock().unwrap() = Some(err);
    }

    pub fn fail_next_find(&self, err: DirectoryError) {
        *self.fail_next_find.lock().unwrap() = Some(err);
    }

    /// Slow down insert_account, for cancellation-deferral tests.
    pub fn set_insert_delay(&self, delay: std::time::Duration) {
        *self.insert_delay.lock().unwrap() = Some(delay);
    }

    /// All records currently held, for test assertions.
    pub fn records(&self) -> Vec<DirectoryRecord> {
        self.records.lock().unwrap().clone()
    }

    async fn authorize(&self) -> Result<(), DirectoryError> {
        match self.slot.read().await.as_ref() {
            Some(session) if session.access_token == self.operator_access_token => Ok(()),
            _ => Err(DirectoryError::Authorization),
        }
    }
}

#[async_trait]
impl DirectoryStore for MockDirectoryStore {
    async fn insert_account(
        &self,
        identity_id: IdentityId,
        profile: &DirectoryProfile,
        role_id: i32,
    ) -> Result<DirectoryRecord, DirectoryError> {
        self.journal
            .record(format!("directory.insert:{}", profile.email));

        let delay = *self.insert_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.authorize().await?;

        if let Some(err) = self.fail_next_insert.lock().unwrap().take() {
            return Err(err);
        }

        if !self.roles.iter().any(|r| r.id == role_id) {
            return Err(DirectoryError::Validation(format!(
                "unknown role id {}",
                role_id
            )));
        }

        let mut records = self.records.lock().unwrap();
        if records.iter().any(|r| r.identity_id == identity_id) {
            return Err(DirectoryError::Conflict);
        }

        let record = DirectoryRecord {
            id: self
                .next_id
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst),
            identity_id,
            given_name: profile.given_name.clone(),
            family_name: profile.family_name.clone(),
            email: profile.email.clone(),
            role_id,
            created_at: chrono::Utc::now(),
        };
        records.push(record.clone());
        Ok(record)
    }

    async fn find_by_identity(
        &self,
        identity_id: IdentityId,
    ) -> Result<Option<DirectoryRecord>, DirectoryError> {
        self.authorize().await?;

        if let Some(err) = self.fail_next_find.lock().unwrap().take() {
            return Err(err);
        }

        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.identity_id == identity_id)
            .cloned())
    }

    async fn list_roles(&self) -> Result<Vec<Role>, DirectoryError> {
        Ok(self.roles.clone())
    }
}
