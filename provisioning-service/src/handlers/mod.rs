pub mod provisioning;

pub use provisioning::{complete_orphan, list_roles, provision_account};
