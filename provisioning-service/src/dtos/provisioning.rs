use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{DirectoryProfile, DirectoryRecord, IdentityId};

/// Operator-submitted intent to provision a new account.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ProvisionAccountRequest {
    #[validate(length(min = 1, message = "Given name is required"))]
    #[schema(example = "Jane")]
    pub given_name: String,

    #[validate(length(min = 1, message = "Family name is required"))]
    #[schema(example = "Doe")]
    pub family_name: String,

    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "jane@example.com")]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(example = "Secret123!", min_length = 8)]
    pub password: String,

    #[schema(example = 2)]
    pub role_id: i32,
}

impl ProvisionAccountRequest {
    pub fn profile(&self) -> DirectoryProfile {
        DirectoryProfile {
            given_name: self.given_name.clone(),
            family_name: self.family_name.clone(),
            email: self.email.clone(),
        }
    }
}

/// Retry payload for completing the directory half of an orphaned account.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CompleteOrphanRequest {
    #[validate(length(min = 1, message = "Given name is required"))]
    #[schema(example = "Jane")]
    pub given_name: String,

    #[validate(length(min = 1, message = "Family name is required"))]
    #[schema(example = "Doe")]
    pub family_name: String,

    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "jane@example.com")]
    pub email: String,

    #[schema(example = 2)]
    pub role_id: i32,
}

impl CompleteOrphanRequest {
    pub fn profile(&self) -> DirectoryProfile {
        DirectoryProfile {
            given_name: self.given_name.clone(),
            family_name: self.family_name.clone(),
            email: self.email.clone(),
        }
    }
}

/// Successful provisioning result: the inserted (or already present)
/// directory record.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProvisionAccountResponse {
    #[schema(example = "completed")]
    pub status: String,
    pub record: DirectoryRecord,
}

impl ProvisionAccountResponse {
    pub fn completed(record: DirectoryRecord) -> Self {
        Self {
            status: "completed".to_string(),
            record,
        }
    }
}

/// Partial-failure result: the identity account exists but no directory
/// record was written. Callers must not treat this as a retry-safe error;
/// re-running the whole workflow would collide on the email. The
/// `identity_id` is what a later directory-only retry needs.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrphanAccountResponse {
    #[schema(example = "orphaned")]
    pub status: String,
    pub identity_id: IdentityId,
    #[schema(example = "directory write failed: unknown role id")]
    pub reason: String,
}

impl OrphanAccountResponse {
    pub fn new(identity_id: IdentityId, reason: String) -> Self {
        Self {
            status: "orphaned".to_string(),
            identity_id,
            reason,
        }
    }
}

/// Role catalog listing.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RolesResponse {
    pub roles: Vec<crate::models::Role>,
}
