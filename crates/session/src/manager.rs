//! Session/RBAC state manager.
//!
//! Owns the authenticated identity, the active organization selection and
//! the role/permission view every screen gates on. State is restored from
//! the local cache synchronously, then reconciled against the RBAC service.
//!
//! Concurrency model:
//! - reads (accessors, predicates) are synchronous and never block on I/O
//! - every refresh carries a [`Ticket`]; only the newest ticket may apply
//! - refresh failures keep the last-known-good state (fail-open to stale)
//! - after [`SessionManager::teardown`] background writes are dropped and any
//!   further use panics

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use chrono::Utc;
use tokio::task::JoinHandle;

use erpdesk_auth::{
    Capabilities, CapabilityExplanation, Credentials, Identity, LoginResponse,
    OrganizationSelection, Permission, RoleCode,
};
use erpdesk_core::{OrganizationId, UserId};

use crate::cache::SessionCache;
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::kv::KeyValueStore;
use crate::observer::{Observers, SubscriptionId};
use crate::provider::{AuthProvider, ProviderError, RbacProvider};
use crate::state::{SessionPhase, SessionSnapshot, SessionState};
use crate::sync::{RbacSync, RefreshError, RefreshOutcome, RefreshTickets, Ticket};

/// Summary of [`SessionManager::initialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    /// An identity was restored from the auth provider.
    pub restored_identity: bool,
    /// At least one cache entry was unreadable and treated as empty.
    pub cache_degraded: bool,
    /// Outcome of the start-up refresh, if one ran.
    pub refresh: Option<RefreshOutcome>,
}

/// Summary of [`SessionManager::logout`]. Local state is always cleared.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogoutReport {
    /// The remote invalidation error, if the provider call failed.
    pub remote_error: Option<ProviderError>,
}

struct Inner {
    auth: Arc<dyn AuthProvider>,
    sync: RbacSync,
    cache: SessionCache,
    state: RwLock<SessionState>,
    observers: Observers,
    tickets: RefreshTickets,
    live: AtomicBool,
}

/// Handle to the session manager. Cloning is cheap; all clones share state.
///
/// Construct one at application start and pass it to every consumer.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        rbac: Arc<dyn RbacProvider>,
        store: Arc<dyn KeyValueStore>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                auth,
                sync: RbacSync::new(rbac, config.refresh_timeout()),
                cache: SessionCache::new(store),
                state: RwLock::new(SessionState::default()),
                observers: Observers::default(),
                tickets: RefreshTickets::new(),
                live: AtomicBool::new(true),
            }),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Restore identity and cached grants, then refresh from the RBAC
    /// service if an identity with an id was restored.
    ///
    /// Never fails: cache corruption and refresh errors degrade to whatever
    /// could be restored. Ends in [`SessionPhase::Ready`].
    pub async fn initialize(&self) -> InitReport {
        self.assert_live();

        let identity = self.inner.auth.current_user();
        let organization = self.read_organization();
        let restored = self.inner.cache.restore();
        let cache_degraded = restored.is_degraded();
        let capabilities = restored.into_capabilities();

        let user_id = identity.as_ref().and_then(|i| i.id.clone());
        let restored_identity = identity.is_some();

        tracing::info!(
            restored_identity,
            cache_degraded,
            roles = capabilities.roles.len(),
            permissions = capabilities.permissions.len(),
            "initializing session"
        );

        self.update(|s| {
            s.phase = SessionPhase::Initializing;
            s.identity = identity;
            s.organization = organization;
            s.capabilities = capabilities;
        });

        let refresh = match user_id {
            Some(user_id) => {
                let ticket = self.begin_refresh();
                Some(self.run_refresh(ticket, user_id).await)
            }
            None => None,
        };

        if self.is_live() {
            self.update(|s| s.phase = SessionPhase::Ready);
        }

        InitReport {
            restored_identity,
            cache_degraded,
            refresh,
        }
    }

    /// Mark the manager dead. In-flight refreshes resolve to
    /// [`RefreshOutcome::Discarded`]; listeners are dropped.
    pub fn teardown(&self) {
        let was_live = {
            // Serialised with the ticket check in `reconcile`.
            let _state = self.write();
            let was_live = self.inner.live.swap(false, Ordering::SeqCst);
            self.inner.tickets.invalidate();
            was_live
        };
        if was_live {
            self.inner.observers.clear();
            tracing::debug!("session manager torn down");
        }
    }

    pub fn is_live(&self) -> bool {
        self.inner.live.load(Ordering::SeqCst)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Actions
    // ─────────────────────────────────────────────────────────────────────

    /// Log in and reconcile roles/permissions for the new identity.
    ///
    /// Role codes from the payload are applied and persisted immediately; the
    /// full refresh then replaces them. A payload without a user id uses its
    /// own permission codes and skips the refresh.
    ///
    /// On failure nothing is committed and the provider's error is returned.
    pub async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, SessionError> {
        self.assert_live();

        let response = self.inner.auth.login(credentials).await.map_err(|e| {
            tracing::warn!(username = %credentials.username, error = %e, "login failed");
            SessionError::Login(e)
        })?;

        if !self.is_live() {
            return Ok(response);
        }

        let identity = response.identity();
        let roles: Vec<RoleCode> = response
            .roles
            .iter()
            .filter(|r| !r.is_empty())
            .map(|r| RoleCode::from(r.clone()))
            .collect();
        let permissions = match identity.id {
            Some(_) => Vec::new(),
            None => response.fallback_permissions(),
        };
        let capabilities = Capabilities::new(roles, permissions);

        let organization = self.read_organization();
        let user_id = identity.id.clone();

        tracing::info!(
            user_id = user_id.as_ref().map(|u| u.as_str()).unwrap_or("<none>"),
            roles = capabilities.roles.len(),
            "logged in"
        );

        self.update(|s| {
            // Refreshes started for a previous identity must not land.
            self.invalidate_refreshes(s);
            if let Err(e) = self.inner.cache.store_capabilities(&capabilities) {
                tracing::warn!(error = %e, "failed to persist login grants");
            }
            s.identity = Some(identity);
            s.organization = organization;
            s.capabilities = capabilities;
            s.last_synced_at = None;
        });

        match user_id {
            Some(user_id) => {
                let ticket = self.begin_refresh();
                let outcome = self.run_refresh(ticket, user_id).await;
                tracing::debug!(?outcome, "post-login refresh finished");
            }
            None => {
                tracing::debug!("login payload has no user id; using payload permissions");
            }
        }

        Ok(response)
    }

    /// End the session. Local state and both cache keys are cleared even if
    /// the remote invalidation fails.
    pub async fn logout(&self) -> LogoutReport {
        self.assert_live();

        let remote_error = match self.inner.auth.logout().await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(error = %e, "remote logout failed; clearing local session anyway");
                Some(e)
            }
        };

        if !self.is_live() {
            return LogoutReport { remote_error };
        }

        self.update(|s| {
            self.invalidate_refreshes(s);
            if let Err(e) = self.inner.cache.clear() {
                tracing::warn!(error = %e, "failed to clear session cache");
            }
            s.clear_session();
        });

        tracing::info!("logged out");
        LogoutReport { remote_error }
    }

    /// Re-read identity, organization and cache synchronously, then refresh
    /// in the background.
    ///
    /// Returns the spawned refresh (if an identity id is present) so callers
    /// may await it; dropping the handle does not cancel it. Must be called
    /// from within a Tokio runtime.
    #[track_caller]
    pub fn refresh_auth(&self) -> Option<JoinHandle<RefreshOutcome>> {
        self.assert_live();

        let identity = self.inner.auth.current_user();
        let organization = self.read_organization();
        let capabilities = self.inner.cache.restore().into_capabilities();
        let user_id = identity.as_ref().and_then(|i| i.id.clone());

        self.update(|s| {
            let previous = s.identity.as_ref().and_then(|i| i.id.as_ref());
            if user_id.is_none() || previous != user_id.as_ref() {
                self.invalidate_refreshes(s);
            }
            s.identity = identity;
            s.organization = organization;
            s.capabilities = capabilities;
        });

        let user_id = user_id?;
        let ticket = self.begin_refresh();
        let this = self.clone();
        Some(tokio::spawn(async move {
            let outcome = this.run_refresh(ticket, user_id).await;
            if let RefreshOutcome::Failed(e) = &outcome {
                tracing::warn!(error = %e, "background RBAC refresh failed");
            }
            outcome
        }))
    }

    /// Record a new organization selection with the auth provider.
    ///
    /// Roles and permissions are not re-fetched.
    #[track_caller]
    pub fn set_current_organization(
        &self,
        id: OrganizationId,
        name: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.assert_live();
        let name = name.into();

        self.inner
            .auth
            .set_current_organization(&id, &name)
            .map_err(SessionError::Organization)?;

        tracing::info!(organization_id = %id, "switched organization");
        self.update(|s| {
            s.organization = Some(OrganizationSelection {
                organization_id: id,
                organization_name: name,
            });
        });
        Ok(())
    }

    /// Refresh roles/permissions for the current identity and wait for it.
    pub async fn reload_rbac_state(&self) -> RefreshOutcome {
        self.assert_live();

        let user_id = self.read().identity.as_ref().and_then(|i| i.id.clone());
        match user_id {
            Some(user_id) => {
                let ticket = self.begin_refresh();
                self.run_refresh(ticket, user_id).await
            }
            None => RefreshOutcome::NoIdentity,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Observation
    // ─────────────────────────────────────────────────────────────────────

    /// Register a listener called with a fresh snapshot after every change.
    #[track_caller]
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&SessionSnapshot) + Send + Sync + 'static,
    {
        self.assert_live();
        self.inner.observers.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.observers.unsubscribe(id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Read-only fields
    // ─────────────────────────────────────────────────────────────────────

    #[track_caller]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.live_read().snapshot()
    }

    #[track_caller]
    pub fn identity(&self) -> Option<Identity> {
        self.live_read().identity.clone()
    }

    #[track_caller]
    pub fn user_id(&self) -> Option<UserId> {
        self.live_read().identity.as_ref().and_then(|i| i.id.clone())
    }

    #[track_caller]
    pub fn organization_id(&self) -> Option<OrganizationId> {
        self.live_read()
            .organization
            .as_ref()
            .map(|o| o.organization_id.clone())
    }

    #[track_caller]
    pub fn organization_name(&self) -> Option<String> {
        self.live_read()
            .organization
            .as_ref()
            .map(|o| o.organization_name.clone())
    }

    #[track_caller]
    pub fn roles(&self) -> Vec<RoleCode> {
        self.live_read().capabilities.roles.clone()
    }

    #[track_caller]
    pub fn permissions(&self) -> Vec<Permission> {
        self.live_read().capabilities.permissions.clone()
    }

    #[track_caller]
    pub fn is_authenticated(&self) -> bool {
        self.live_read().identity.is_some()
    }

    #[track_caller]
    pub fn is_loading(&self) -> bool {
        self.live_read().loading()
    }

    #[track_caller]
    pub fn phase(&self) -> SessionPhase {
        self.live_read().phase
    }

    // ─────────────────────────────────────────────────────────────────────
    // Capability predicates
    // ─────────────────────────────────────────────────────────────────────

    #[track_caller]
    pub fn has_role(&self, code: &str) -> bool {
        self.live_read().capabilities.has_role(code)
    }

    #[track_caller]
    pub fn has_permission(&self, code: &str) -> bool {
        self.live_read().capabilities.has_permission(code)
    }

    #[track_caller]
    pub fn has_any_permission<I, S>(&self, codes: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.live_read().capabilities.has_any_permission(codes)
    }

    #[track_caller]
    pub fn can_view(&self, resource: &str) -> bool {
        self.live_read().capabilities.can_view(resource)
    }

    #[track_caller]
    pub fn can_manage(&self, resource: &str) -> bool {
        self.live_read().capabilities.can_manage(resource)
    }

    #[track_caller]
    pub fn explain(&self, resource: &str) -> CapabilityExplanation {
        self.live_read().capabilities.explain(resource)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Refresh internals
    // ─────────────────────────────────────────────────────────────────────

    /// Take a ticket and mark a refresh in flight. Synchronous so that a
    /// caller issuing two refreshes back to back gets ordered tickets.
    fn begin_refresh(&self) -> Ticket {
        let ticket = self.inner.tickets.issue();
        self.update(|s| {
            s.pending.insert(ticket);
        });
        tracing::debug!(%ticket, "RBAC refresh dispatched");
        ticket
    }

    async fn run_refresh(&self, ticket: Ticket, user_id: UserId) -> RefreshOutcome {
        let fetched = self.inner.sync.fetch(&user_id).await;

        if !self.is_live() {
            tracing::debug!(%ticket, "session torn down; dropping refresh result");
            return RefreshOutcome::Discarded;
        }

        let outcome = self.reconcile(ticket, &user_id, fetched);
        self.update(|s| {
            s.pending.remove(&ticket);
        });
        outcome
    }

    /// Apply a fetch result if `ticket` is still the newest one.
    ///
    /// The ticket check and the state write happen under one write lock, so a
    /// newer refresh cannot slip in between.
    fn reconcile(
        &self,
        ticket: Ticket,
        user_id: &UserId,
        fetched: Result<Capabilities, RefreshError>,
    ) -> RefreshOutcome {
        let capabilities = match fetched {
            Ok(caps) => caps,
            Err(e) => {
                tracing::warn!(%ticket, user_id = %user_id, error = %e, "RBAC refresh failed; keeping last-known-good grants");
                return RefreshOutcome::Failed(e);
            }
        };

        let outcome = {
            let mut state = self.write();
            if !self.is_live() {
                return RefreshOutcome::Discarded;
            }
            if !self.inner.tickets.is_current(ticket) {
                None
            } else {
                if let Err(e) = self.inner.cache.store_capabilities(&capabilities) {
                    tracing::warn!(error = %e, "failed to persist refreshed grants");
                }
                let applied = RefreshOutcome::Applied {
                    roles: capabilities.roles.len(),
                    permissions: capabilities.permissions.len(),
                };
                state.capabilities = capabilities;
                state.last_synced_at = Some(Utc::now());
                Some((applied, state.snapshot()))
            }
        };

        match outcome {
            Some((applied, snapshot)) => {
                tracing::debug!(%ticket, user_id = %user_id, ?applied, "RBAC refresh applied");
                self.inner.observers.notify(&snapshot);
                applied
            }
            None => {
                tracing::debug!(%ticket, user_id = %user_id, "RBAC refresh superseded by a newer request");
                RefreshOutcome::Superseded { ticket }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // State plumbing
    // ─────────────────────────────────────────────────────────────────────

    /// Advance the ticket counter and forget in-flight refreshes. Called with
    /// the state lock held so no reconcile can interleave.
    fn invalidate_refreshes(&self, state: &mut SessionState) {
        self.inner.tickets.invalidate();
        state.pending.clear();
    }

    fn read_organization(&self) -> Option<OrganizationSelection> {
        let id = self.inner.auth.current_organization_id()?;
        Some(OrganizationSelection {
            organization_id: id,
            organization_name: self.inner.auth.current_organization_name().unwrap_or_default(),
        })
    }

    /// Mutate state, then notify listeners with the resulting snapshot.
    fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut SessionState),
    {
        let snapshot = {
            let mut state = self.write();
            f(&mut state);
            state.snapshot()
        };
        self.inner.observers.notify(&snapshot);
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, SessionState> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    #[track_caller]
    fn live_read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.assert_live();
        self.read()
    }

    #[track_caller]
    fn assert_live(&self) {
        if !self.is_live() {
            panic!(
                "SessionManager used after teardown: session state is only available while the manager is active"
            );
        }
    }
}

impl core::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.read();
        f.debug_struct("SessionManager")
            .field("live", &self.is_live())
            .field("phase", &state.phase)
            .field("authenticated", &state.identity.is_some())
            .field("pending_refreshes", &state.pending.len())
            .finish_non_exhaustive()
    }
}
