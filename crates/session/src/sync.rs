//! Role/permission refresh protocol.
//!
//! A refresh fetches the remote role list and permission list together and
//! yields either a complete replacement [`Capabilities`] or an error. It
//! never produces a partial result: if either call fails (or the pair times
//! out) the caller keeps its last-known-good state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;

use erpdesk_auth::{Capabilities, retain_coded, role_codes};
use erpdesk_core::UserId;

use crate::provider::{ProviderError, RbacProvider};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("RBAC provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("RBAC refresh timed out after {0:?}")]
    Timeout(Duration),
}

/// What happened to one refresh request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Remote state replaced local state wholesale.
    Applied { roles: usize, permissions: usize },
    /// The fetch succeeded, but a newer request was issued meanwhile; the
    /// result was dropped.
    Superseded { ticket: Ticket },
    /// The fetch failed; local state was left untouched.
    Failed(RefreshError),
    /// The manager was torn down before the result arrived.
    Discarded,
    /// There was no identity (or no identity id) to refresh for.
    NoIdentity,
}

impl RefreshOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Sequence number attached to a refresh request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

impl Ticket {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for Ticket {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic ticket dispenser. Only the most recently issued ticket may
/// apply its result.
#[derive(Debug, Default)]
pub struct RefreshTickets {
    latest: AtomicU64,
}

impl RefreshTickets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> Ticket {
        Ticket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Invalidate every outstanding ticket without starting a refresh
    /// (identity changes, logout).
    pub fn invalidate(&self) {
        self.latest.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }
}

/// Fetches and normalises remote RBAC state for one user.
#[derive(Clone)]
pub struct RbacSync {
    rbac: Arc<dyn RbacProvider>,
    timeout: Duration,
}

impl RbacSync {
    pub fn new(rbac: Arc<dyn RbacProvider>, timeout: Duration) -> Self {
        Self { rbac, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Issue both remote calls concurrently and combine them.
    ///
    /// Roles without a code and permissions with an empty code are dropped.
    pub async fn fetch(&self, user_id: &UserId) -> Result<Capabilities, RefreshError> {
        let both = async {
            tokio::try_join!(
                self.rbac.user_roles(user_id),
                self.rbac.user_permissions(user_id)
            )
        };

        let (roles, permissions) = tokio::time::timeout(self.timeout, both)
            .await
            .map_err(|_| RefreshError::Timeout(self.timeout))??;

        Ok(Capabilities::new(role_codes(&roles), retain_coded(permissions)))
    }
}

impl core::fmt::Debug for RbacSync {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RbacSync")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use erpdesk_auth::{Permission, Role, RoleCode};

    struct FixedRbac {
        roles: Result<Vec<Role>, ProviderError>,
        permissions: Result<Vec<Permission>, ProviderError>,
        delay: Duration,
    }

    #[async_trait]
    impl RbacProvider for FixedRbac {
        async fn user_roles(&self, _user_id: &UserId) -> Result<Vec<Role>, ProviderError> {
            tokio::time::sleep(self.delay).await;
            self.roles.clone()
        }

        async fn user_permissions(&self, _user_id: &UserId) -> Result<Vec<Permission>, ProviderError> {
            tokio::time::sleep(self.delay).await;
            self.permissions.clone()
        }
    }

    fn sync(rbac: FixedRbac) -> RbacSync {
        RbacSync::new(Arc::new(rbac), Duration::from_secs(5))
    }

    #[test]
    fn only_latest_ticket_is_current() {
        let tickets = RefreshTickets::new();
        let first = tickets.issue();
        assert!(tickets.is_current(first));

        let second = tickets.issue();
        assert!(!tickets.is_current(first));
        assert!(tickets.is_current(second));
        assert!(second > first);

        tickets.invalidate();
        assert!(!tickets.is_current(second));
    }

    #[tokio::test]
    async fn fetch_normalises_remote_records() {
        let s = sync(FixedRbac {
            roles: Ok(vec![Role::new("ADMIN"), Role { code: None }]),
            permissions: Ok(vec![
                Permission::new("P1", "invoices", "manage", true),
                Permission::new("", "invoices", "view", true),
            ]),
            delay: Duration::ZERO,
        });

        let caps = s.fetch(&UserId::new("u1")).await.unwrap();
        assert_eq!(caps.roles, vec![RoleCode::new("ADMIN")]);
        assert_eq!(caps.permissions.len(), 1);
    }

    #[tokio::test]
    async fn one_failed_call_fails_the_whole_fetch() {
        let s = sync(FixedRbac {
            roles: Ok(vec![Role::new("ADMIN")]),
            permissions: Err(ProviderError::Network("connection reset".into())),
            delay: Duration::ZERO,
        });

        let err = s.fetch(&UserId::new("u1")).await.unwrap_err();
        assert_eq!(
            err,
            RefreshError::Provider(ProviderError::Network("connection reset".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out() {
        let s = sync(FixedRbac {
            roles: Ok(vec![]),
            permissions: Ok(vec![]),
            delay: Duration::from_secs(60),
        });

        let err = s.fetch(&UserId::new("u1")).await.unwrap_err();
        assert_eq!(err, RefreshError::Timeout(Duration::from_secs(5)));
    }
}
