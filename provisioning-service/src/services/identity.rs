//! Identity provider client.
//!
//! Wraps the provider's account-creation and token endpoints. The provider
//! documents that a successful signup also replaces the caller's ambient
//! session with one belonging to the new account; the client models that by
//! writing the returned session into the shared slot. The orchestrator plans
//! around this side effect, it does not suppress it.

use chrono::{Duration, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use service_core::async_trait::async_trait;
use uuid::Uuid;

use crate::models::{AdminSession, IdentityId, SessionSlot};
use crate::services::error::{IdentityError, SessionRestoreError};

/// Display attributes forwarded to the identity provider on signup.
#[derive(Debug, Clone, Serialize)]
pub struct DisplayAttributes {
    pub given_name: String,
    pub family_name: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create a credentialed account.
    ///
    /// On success the provider has already swapped the ambient session to the
    /// new account's. On any error the ambient session is unchanged, except
    /// `Transient`, which guarantees nothing and must be re-verified.
    async fn create_account(
        &self,
        email: &str,
        password: &str,
        attributes: DisplayAttributes,
    ) -> Result<IdentityId, IdentityError>;

    /// Authenticate with operator credentials and install the resulting
    /// session as the ambient one. Used once at startup.
    async fn sign_in(&self, email: &str, password: &str) -> Result<AdminSession, IdentityError>;

    /// Exchange a refresh credential for a fresh session. Does not touch the
    /// ambient slot; the session guard owns that write.
    async fn refresh_session(
        &self,
        refresh_token: &str,
    ) -> Result<AdminSession, SessionRestoreError>;
}

/// Session payload returned by the provider's signup and token endpoints.
#[derive(Debug, Deserialize)]
struct SessionPayload {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: IdentityUser,
}

#[derive(Debug, Deserialize)]
struct IdentityUser {
    id: Uuid,
}

impl SessionPayload {
    fn into_session(self) -> AdminSession {
        AdminSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            identity_id: IdentityId(self.user.id),
            expires_at: Utc::now() + Duration::seconds(self.expires_in),
        }
    }
}

/// HTTP client for the identity provider.
#[derive(Clone)]
pub struct HttpIdentityProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    slot: SessionSlot,
}

impl HttpIdentityProvider {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: &str, slot: SessionSlot) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            slot,
        }
    }

    async fn token_request(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, reqwest::Error> {
        self.http
            .post(format!("{}/token?grant_type={}", self.base_url, grant_type))
            .header("apikey", &self.api_key)
            .json(&body)
            .send()
            .await
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn create_account(
        &self,
        email: &str,
        password: &str,
        attributes: DisplayAttributes,
    ) -> Result<IdentityId, IdentityError> {
        let res = self
            .http
            .post(format!("{}/signup", self.base_url))
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({
                "email": email,
                "password": password,
                "data": attributes,
            }))
            .send()
            .await
            .map_err(|e| IdentityError::Transient(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(classify_signup_failure(status, &body));
        }

        let payload: SessionPayload = res
            .json()
            .await
            .map_err(|e| IdentityError::Transient(format!("malformed signup response: {}", e)))?;
        let session = payload.into_session();
        let identity_id = session.identity_id;

        // Documented provider behavior: the ambient session now belongs to
        // the account that was just created.
        *self.slot.write().await = Some(session);

        tracing::info!(
            identity_id = %identity_id,
            email = %email,
            "Identity account created, ambient session swapped to new account"
        );

        Ok(identity_id)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AdminSession, IdentityError> {
        let res = self
            .token_request(
                "password",
                serde_json::json!({ "email": email, "password": password }),
            )
            .await
            .map_err(|e| IdentityError::Transient(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(IdentityError::Transient(format!(
                "sign-in returned {}: {}",
                status,
                error_message(&body)
            )));
        }

        let payload: SessionPayload = res
            .json()
            .await
            .map_err(|e| IdentityError::Transient(format!("malformed sign-in response: {}", e)))?;
        let session = payload.into_session();

        *self.slot.write().await = Some(session.clone());

        tracing::info!(identity_id = %session.identity_id, "Operator session established");

        Ok(session)
    }

    async fn refresh_session(
        &self,
        refresh_token: &str,
    ) -> Result<AdminSession, SessionRestoreError> {
        let res = self
            .token_request(
                "refresh_token",
                serde_json::json!({ "refresh_token": refresh_token }),
            )
            .await
            .map_err(|e| SessionRestoreError::Transient(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(classify_refresh_failure(status, &body));
        }

        let payload: SessionPayload = res.json().await.map_err(|e| {
            SessionRestoreError::Transient(format!("malformed token response: {}", e))
        })?;

        Ok(payload.into_session())
    }
}

/// Classify a non-success signup response into the closed identity error set.
fn classify_signup_failure(status: StatusCode, body: &str) -> IdentityError {
    let message = error_message(body);
    match status {
        StatusCode::CONFLICT => IdentityError::Duplicate,
        StatusCode::BAD_REQUEST if message.to_lowercase().contains("already registered") => {
            IdentityError::Duplicate
        }
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            IdentityError::WeakCredential(message)
        }
        _ => IdentityError::Transient(format!("signup returned {}: {}", status, message)),
    }
}

fn classify_refresh_failure(status: StatusCode, body: &str) -> SessionRestoreError {
    let message = error_message(body);
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SessionRestoreError::RefreshRejected(message)
        }
        _ => SessionRestoreError::Transient(format!("token returned {}: {}", status, message)),
    }
}

/// Pull a human-readable message out of a provider error body.
fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["msg", "message", "error_description", "error"] {
            if let Some(msg) = value.get(key).and_then(|v| v.as_str()) {
                return msg.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no detail".to_string()
    } else {
        trimmed.chars().take(200).collect()
    }
}

/// In-memory identity provider for tests and local development.
///
/// Reproduces the provider's contract faithfully: a successful signup swaps
/// the ambient session to the new account, failed signups leave it alone,
/// and refresh only honors the operator's refresh credential.
pub struct MockIdentityProvider {
    slot: SessionSlot,
    operator: AdminSession,
    registered: std::sync::Mutex<std::collections::HashSet<String>>,
    fail_next_create: std::sync::Mutex<Option<IdentityError>>,
    reject_refresh: std::sync::atomic::AtomicBool,
    create_delay: std::sync::Mutex<Option<std::time::Duration>>,
    journal: crate::services::CallJournal,
}

impl MockIdentityProvider {
    pub fn new(slot: SessionSlot, operator: AdminSession) -> Self {
        Self {
            slot,
            operator,
            registered: std::sync::Mutex::new(std::collections::HashSet::new()),
            fail_next_create: std::sync::Mutex::new(None),
            reject_refresh: std::sync::atomic::AtomicBool::new(false),
            create_delay: std::sync::Mutex::new(None),
            journal: crate::services::CallJournal::default(),
        }
    }

    pub fn with_journal(mut self, journal: crate::services::CallJournal) -> Self {
        self.journal = journal;
        self
    }

    /// Make the next create_account call fail with the given error.
    pub fn fail_next_create(&self, err: IdentityError) {
        *self.fail_next_create.lock().unwrap() = Some(err);
    }

    /// Make every refresh attempt fail as if the token had expired.
    pub fn reject_refresh(&self) {
        self.reject_refresh
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    /// Slow down create_account, for interleaving tests.
    pub fn set_create_delay(&self, delay: std::time::Duration) {
        *self.create_delay.lock().unwrap() = Some(delay);
    }

    fn new_account_session(identity_id: IdentityId) -> AdminSession {
        AdminSession {
            access_token: format!("acct-access-{}", identity_id),
            refresh_token: format!("acct-refresh-{}", identity_id),
            identity_id,
            expires_at: Utc::now() + Duration::hours(1),
        }
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn create_account(
        &self,
        email: &str,
        _password: &str,
        _attributes: DisplayAttributes,
    ) -> Result<IdentityId, IdentityError> {
        self.journal.record(format!("identity.create:{}", email));

        let delay = *self.create_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = self.fail_next_create.lock().unwrap().take() {
            return Err(err);
        }

        if !self.registered.lock().unwrap().insert(email.to_string()) {
            return Err(IdentityError::Duplicate);
        }

        let identity_id = IdentityId::new();
        *self.slot.write().await = Some(Self::new_account_session(identity_id));
        Ok(identity_id)
    }

    async fn sign_in(&self, _email: &str, _password: &str) -> Result<AdminSession, IdentityError> {
        *self.slot.write().await = Some(self.operator.clone());
        Ok(self.operator.clone())
    }

    async fn refresh_session(
        &self,
        refresh_token: &str,
    ) -> Result<AdminSession, SessionRestoreError> {
        self.journal.record("identity.refresh".to_string());

        if self.reject_refresh.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(SessionRestoreError::RefreshRejected(
                "refresh token expired".to_string(),
            ));
        }
        if refresh_token != self.operator.refresh_token {
            return Err(SessionRestoreError::RefreshRejected(
                "unknown refresh token".to_string(),
            ));
        }
        Ok(self.operator.clone())
    }
}
