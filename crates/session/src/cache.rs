//! Local mirror of the session's roles and permissions.
//!
//! The cache is a best-effort snapshot: it is read at start-up so capability
//! checks work before the remote refresh lands, and it is never consulted to
//! decide whether a user is authenticated.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use erpdesk_auth::{Capabilities, Permission, RoleCode};

use crate::kv::{KeyValueStore, StoreError};

/// Key holding the JSON array of role codes.
pub const ROLE_CACHE_KEY: &str = "user_roles";
/// Key holding the JSON array of permissions.
pub const PERMISSION_CACHE_KEY: &str = "user_permissions";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store error for '{key}': {source}")]
    Store {
        key: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("cached value under '{key}' is malformed: {source}")]
    Corrupt {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode value for '{key}': {source}")]
    Encode {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Result of reading one cache entry.
///
/// `Degraded` means the entry exists (or the store failed) but cannot be
/// used; callers fall back to the empty value.
#[derive(Debug)]
pub enum CacheRead<T> {
    Hit(T),
    Missing,
    Degraded(CacheError),
}

impl<T: Default> CacheRead<T> {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }

    /// Collapse to a usable value, logging a degraded read.
    pub fn degrade(self) -> T {
        match self {
            Self::Hit(value) => value,
            Self::Missing => T::default(),
            Self::Degraded(err) => {
                tracing::warn!(error = %err, "ignoring unusable session cache entry");
                T::default()
            }
        }
    }
}

/// Both cache entries as read at restore time.
#[derive(Debug)]
pub struct RestoredCache {
    pub roles: CacheRead<Vec<RoleCode>>,
    pub permissions: CacheRead<Vec<Permission>>,
}

impl RestoredCache {
    pub fn is_degraded(&self) -> bool {
        self.roles.is_degraded() || self.permissions.is_degraded()
    }

    pub fn into_capabilities(self) -> Capabilities {
        Capabilities::new(self.roles.degrade(), self.permissions.degrade())
    }
}

/// Typed adapter over the two cache keys. This component is their only writer.
#[derive(Clone)]
pub struct SessionCache {
    store: Arc<dyn KeyValueStore>,
}

impl SessionCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn load_roles(&self) -> CacheRead<Vec<RoleCode>> {
        self.load(ROLE_CACHE_KEY)
    }

    pub fn load_permissions(&self) -> CacheRead<Vec<Permission>> {
        self.load(PERMISSION_CACHE_KEY)
    }

    pub fn restore(&self) -> RestoredCache {
        RestoredCache {
            roles: self.load_roles(),
            permissions: self.load_permissions(),
        }
    }

    pub fn store_roles(&self, roles: &[RoleCode]) -> Result<(), CacheError> {
        self.save(ROLE_CACHE_KEY, roles)
    }

    pub fn store_permissions(&self, permissions: &[Permission]) -> Result<(), CacheError> {
        self.save(PERMISSION_CACHE_KEY, permissions)
    }

    /// Persist both collections. Both writes are attempted even if the first
    /// fails; the first error is returned.
    pub fn store_capabilities(&self, caps: &Capabilities) -> Result<(), CacheError> {
        let roles = self.store_roles(&caps.roles);
        let permissions = self.store_permissions(&caps.permissions);
        roles.and(permissions)
    }

    /// Delete both keys.
    pub fn clear(&self) -> Result<(), CacheError> {
        let roles = self.remove(ROLE_CACHE_KEY);
        let permissions = self.remove(PERMISSION_CACHE_KEY);
        roles.and(permissions)
    }

    fn load<T: DeserializeOwned>(&self, key: &'static str) -> CacheRead<T> {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return CacheRead::Missing,
            Err(source) => return CacheRead::Degraded(CacheError::Store { key, source }),
        };

        match serde_json::from_str(&raw) {
            Ok(value) => CacheRead::Hit(value),
            Err(source) => CacheRead::Degraded(CacheError::Corrupt { key, source }),
        }
    }

    fn save<T: Serialize + ?Sized>(&self, key: &'static str, value: &T) -> Result<(), CacheError> {
        let payload =
            serde_json::to_string(value).map_err(|source| CacheError::Encode { key, source })?;
        self.store
            .set(key, &payload)
            .map_err(|source| CacheError::Store { key, source })
    }

    fn remove(&self, key: &'static str) -> Result<(), CacheError> {
        self.store
            .remove(key)
            .map_err(|source| CacheError::Store { key, source })
    }
}

impl core::fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionCache").finish_non_exhaustive()
    }
}
