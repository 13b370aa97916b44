//! Role catalog - read-only reference data from the directory store.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::models::Role;
use crate::services::directory::DirectoryStore;
use crate::services::error::DirectoryError;

/// In-memory snapshot of valid role ids. The directory store owns the
/// source of truth; an unknown role id is a validation failure before any
/// remote call is made.
#[derive(Clone, Default)]
pub struct RoleCatalog {
    roles: Arc<RwLock<HashMap<i32, Role>>>,
}

impl RoleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_roles(roles: Vec<Role>) -> Self {
        let catalog = Self::new();
        let map = roles.into_iter().map(|r| (r.id, r)).collect();
        *catalog.roles.try_write().expect("fresh catalog lock") = map;
        catalog
    }

    /// Replace the snapshot with the store's current catalog.
    pub async fn load(&self, store: &dyn DirectoryStore) -> Result<usize, DirectoryError> {
        let roles = store.list_roles().await?;
        let count = roles.len();
        let map: HashMap<i32, Role> = roles.into_iter().map(|r| (r.id, r)).collect();
        *self.roles.write().await = map;
        tracing::info!(count, "Role catalog loaded");
        Ok(count)
    }

    pub async fn contains(&self, role_id: i32) -> bool {
        self.roles.read().await.contains_key(&role_id)
    }

    pub async fn all(&self) -> Vec<Role> {
        let mut roles: Vec<Role> = self.roles.read().await.values().cloned().collect();
        roles.sort_by_key(|r| r.id);
        roles
    }

    pub async fn is_empty(&self) -> bool {
        self.roles.read().await.is_empty()
    }
}
