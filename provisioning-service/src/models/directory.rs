//! Directory store models - profile and role-assignment records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::IdentityId;

/// A profile record in the directory store, bound to an identity account.
///
/// Created exactly once per provisioned account, and only ever through the
/// privileged procedure. The `identity_id` is the cross-store foreign key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DirectoryRecord {
    pub id: i64,
    pub identity_id: IdentityId,
    pub given_name: String,
    pub family_name: String,
    #[schema(example = "jane@example.com")]
    pub email: String,
    pub role_id: i32,
    pub created_at: DateTime<Utc>,
}

/// Profile attributes carried from the provisioning request into the
/// directory write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryProfile {
    pub given_name: String,
    pub family_name: String,
    pub email: String,
}

/// A role from the read-only role catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Role {
    pub id: i32,
    #[schema(example = "Editor")]
    pub name: String,
}
