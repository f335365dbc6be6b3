//! `erpdesk-auth`: pure authorization model for the ERP client.
//!
//! This crate is decoupled from HTTP, storage and async: it
//! holds the identity/role/permission types and the capability predicates
//! every screen gates on.

pub mod capabilities;
pub mod identity;
pub mod permissions;
pub mod roles;

pub use capabilities::{Capabilities, CapabilityExplanation, GrantMatch};
pub use identity::{Credentials, Identity, LoginResponse, OrganizationSelection};
pub use permissions::{Permission, PermissionAction, retain_coded};
pub use roles::{Role, RoleCode, role_codes};
