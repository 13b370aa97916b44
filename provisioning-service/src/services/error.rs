//! Error taxonomy for the provisioning workflow.
//!
//! Each remote collaborator gets its own closed error set, and the
//! orchestrator folds them into the outcome classification. Errors raised
//! after identity creation succeeded are never collapsed into a generic
//! failure: they carry the created identity id so the caller can remediate.

use service_core::error::AppError;
use thiserror::Error;

/// Failures from the identity provider's account-creation call.
///
/// None of these leave the ambient session mutated, except that `Transient`
/// gives no guarantee either way and must be treated as unknown.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("an account already exists for this email")]
    Duplicate,

    #[error("credential rejected by provider policy: {0}")]
    WeakCredential(String),

    #[error("identity provider unavailable: {0}")]
    Transient(String),
}

/// Failure to re-establish the operator's session from a snapshot.
///
/// Higher severity than ordinary request errors: mid-workflow it strips the
/// operator of privilege and orphans the identity created just before it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionRestoreError {
    #[error("refresh credential rejected: {0}")]
    RefreshRejected(String),

    #[error("identity provider unreachable during session restore: {0}")]
    Transient(String),
}

/// Failures from the directory store's privileged procedure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("ambient session lacks operator privilege")]
    Authorization,

    #[error("directory rejected the record: {0}")]
    Validation(String),

    #[error("a directory record already exists for this identity")]
    Conflict,

    #[error("directory call timed out before a definitive answer")]
    Timeout,

    #[error("directory store unavailable: {0}")]
    Transient(String),
}

/// Terminal failures where nothing was created and a plain retry is safe.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProvisionError {
    #[error("invalid provisioning request: {0}")]
    Validation(String),

    #[error("no active operator session")]
    NoOperatorSession,

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

/// Why a created identity account ended up without a directory record.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrphanReason {
    #[error("operator session could not be restored: {0}")]
    SessionRestore(#[from] SessionRestoreError),

    #[error("directory write failed: {0}")]
    Directory(#[from] DirectoryError),

    #[error("directory write outcome unknown, record needs verification")]
    Unverified,
}

impl From<ProvisionError> for AppError {
    fn from(err: ProvisionError) -> Self {
        match err {
            ProvisionError::Validation(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            ProvisionError::NoOperatorSession => AppError::ServiceUnavailable,
            ProvisionError::Identity(IdentityError::Duplicate) => {
                AppError::Conflict(anyhow::anyhow!("An account already exists for this email"))
            }
            ProvisionError::Identity(IdentityError::WeakCredential(msg)) => {
                AppError::BadRequest(anyhow::anyhow!("Credential rejected: {}", msg))
            }
            ProvisionError::Identity(IdentityError::Transient(msg)) => AppError::BadGateway(msg),
        }
    }
}
