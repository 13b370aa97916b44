pub mod directory;
pub mod session;

pub use directory::{DirectoryProfile, DirectoryRecord, Role};
pub use session::{new_session_slot, AdminSession, IdentityId, SessionSlot};
