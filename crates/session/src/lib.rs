//! `erpdesk-session`
//!
//! **Responsibility:** the client's session and authorization state.
//!
//! This crate provides:
//! - The session manager (identity, organization selection, roles,
//!   permissions, loading state) and its capability predicates
//! - A local cache of roles/permissions so screens render before the network
//!   answers
//! - The refresh protocol reconciling that cache with the RBAC service
//!
//! The identity provider, the RBAC service and persistent storage are
//! collaborators behind traits; REST implementations live behind the `http`
//! feature.

pub mod cache;
pub mod config;
pub mod error;
pub mod kv;
pub mod manager;
pub mod observer;
pub mod provider;
pub mod state;
pub mod sync;

#[cfg(feature = "http")]
pub mod http;

pub use cache::{CacheError, CacheRead, PERMISSION_CACHE_KEY, ROLE_CACHE_KEY, SessionCache};
pub use config::{ConfigError, SessionConfig};
pub use error::SessionError;
pub use kv::{KeyValueStore, MemoryStore, RedbStore, StoreError};
pub use manager::{InitReport, LogoutReport, SessionManager};
pub use observer::{SessionListener, SubscriptionId};
pub use provider::{AuthProvider, ProviderError, RbacProvider};
pub use state::{SessionPhase, SessionSnapshot};
pub use sync::{RefreshError, RefreshOutcome, Ticket};
