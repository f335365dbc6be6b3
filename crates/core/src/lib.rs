//! `erpdesk-core`: shared identifiers and the domain error model.
//!
//! No I/O, no async. Everything above this crate speaks in these types.

pub mod error;
pub mod id;

pub use error::DomainError;
pub use id::{OrganizationId, UserId};
