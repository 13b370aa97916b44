//! Services layer for the provisioning service.
//!
//! The workflow collaborators (identity provider, directory store, session
//! guard) and the orchestrator that sequences them.

pub mod catalog;
pub mod directory;
pub mod error;
pub mod identity;
pub mod orchestrator;
pub mod session;

pub use catalog::RoleCatalog;
pub use directory::{DirectoryStore, HttpDirectoryStore, MockDirectoryStore};
pub use error::{
    DirectoryError, IdentityError, OrphanReason, ProvisionError, SessionRestoreError,
};
pub use identity::{DisplayAttributes, HttpIdentityProvider, IdentityProvider, MockIdentityProvider};
pub use orchestrator::{ProvisionOutcome, ProvisioningService};
pub use session::SessionGuard;

/// Shared, ordered log of collaborator calls. The mock collaborators append
/// to it so tests can assert cross-collaborator call ordering.
#[derive(Clone, Default)]
pub struct CallJournal(std::sync::Arc<std::sync::Mutex<Vec<String>>>);

impl CallJournal {
    pub fn record(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}
