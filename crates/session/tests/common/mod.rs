//! Scripted collaborators for session manager tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use erpdesk_auth::{Credentials, Identity, LoginResponse, Permission, Role};
use erpdesk_core::{OrganizationId, UserId};
use erpdesk_session::{
    AuthProvider, KeyValueStore, MemoryStore, PERMISSION_CACHE_KEY, ProviderError, RbacProvider,
    ROLE_CACHE_KEY, SessionConfig, SessionManager, StoreError,
};

pub fn identity(id: &str) -> Identity {
    Identity {
        id: Some(UserId::new(id)),
        username: format!("{id}-user"),
        email: format!("{id}@example.com"),
        first_name: "Test".into(),
        last_name: "User".into(),
    }
}

pub fn perm(code: &str, resource: &str, action: &str, active: bool) -> Permission {
    Permission::new(code, resource, action, active)
}

// ─────────────────────────────────────────────────────────────────────────────
// Auth provider
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeAuth {
    current_user: Mutex<Option<Identity>>,
    organization: Mutex<Option<(OrganizationId, String)>>,
    login_result: Mutex<Option<Result<LoginResponse, ProviderError>>>,
    logout_fails: AtomicBool,
    pub logout_calls: AtomicUsize,
}

impl FakeAuth {
    pub fn signed_out() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn signed_in(identity: Identity) -> Arc<Self> {
        let auth = Self::default();
        *auth.current_user.lock().unwrap() = Some(identity);
        Arc::new(auth)
    }

    pub fn with_organization(self: Arc<Self>, id: &str, name: &str) -> Arc<Self> {
        *self.organization.lock().unwrap() = Some((OrganizationId::new(id), name.to_string()));
        self
    }

    pub fn will_login(&self, result: Result<LoginResponse, ProviderError>) {
        *self.login_result.lock().unwrap() = Some(result);
    }

    pub fn fail_logout(&self) {
        self.logout_fails.store(true, Ordering::SeqCst);
    }

    pub fn set_current_user(&self, identity: Option<Identity>) {
        *self.current_user.lock().unwrap() = identity;
    }
}

#[async_trait]
impl AuthProvider for FakeAuth {
    async fn login(&self, _credentials: &Credentials) -> Result<LoginResponse, ProviderError> {
        let result = self
            .login_result
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(ProviderError::Rejected("no scripted login".into())));

        if let Ok(resp) = &result {
            *self.current_user.lock().unwrap() = Some(resp.identity());
            if let Some(org) = &resp.organization_id {
                *self.organization.lock().unwrap() = Some((
                    org.clone(),
                    resp.organization_name.clone().unwrap_or_default(),
                ));
            }
        }
        result
    }

    async fn logout(&self) -> Result<(), ProviderError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        *self.current_user.lock().unwrap() = None;
        *self.organization.lock().unwrap() = None;
        if self.logout_fails.load(Ordering::SeqCst) {
            Err(ProviderError::Network("connection refused".into()))
        } else {
            Ok(())
        }
    }

    fn current_user(&self) -> Option<Identity> {
        self.current_user.lock().unwrap().clone()
    }

    fn current_organization_id(&self) -> Option<OrganizationId> {
        self.organization.lock().unwrap().as_ref().map(|(id, _)| id.clone())
    }

    fn current_organization_name(&self) -> Option<String> {
        self.organization
            .lock()
            .unwrap()
            .as_ref()
            .map(|(_, name)| name.clone())
    }

    fn set_current_organization(&self, id: &OrganizationId, name: &str) -> Result<(), ProviderError> {
        *self.organization.lock().unwrap() = Some((id.clone(), name.to_string()));
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RBAC provider
// ─────────────────────────────────────────────────────────────────────────────

/// One scripted response, delivered after `delay` (virtual time in paused
/// tests).
#[derive(Clone)]
pub struct Reply<T> {
    pub result: Result<T, ProviderError>,
    pub delay: Duration,
}

impl<T> Reply<T> {
    pub fn ok(value: T) -> Self {
        Self {
            result: Ok(value),
            delay: Duration::ZERO,
        }
    }

    pub fn err(error: ProviderError) -> Self {
        Self {
            result: Err(error),
            delay: Duration::ZERO,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Replies are consumed in call order; an exhausted script answers with
/// empty lists.
#[derive(Default)]
pub struct ScriptedRbac {
    roles: Mutex<VecDeque<Reply<Vec<Role>>>>,
    permissions: Mutex<VecDeque<Reply<Vec<Permission>>>>,
    pub role_calls: Mutex<Vec<UserId>>,
    pub permission_calls: AtomicUsize,
}

impl ScriptedRbac {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Script one refresh.
    pub fn then(&self, roles: Reply<Vec<Role>>, permissions: Reply<Vec<Permission>>) -> &Self {
        self.roles.lock().unwrap().push_back(roles);
        self.permissions.lock().unwrap().push_back(permissions);
        self
    }

    /// Script one successful, immediate refresh.
    pub fn then_ok(&self, roles: &[&str], permissions: Vec<Permission>) -> &Self {
        let roles: Vec<Role> = roles.iter().map(|r| Role::new(*r)).collect();
        self.then(Reply::ok(roles), Reply::ok(permissions))
    }

    pub fn refresh_count(&self) -> usize {
        self.role_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl RbacProvider for ScriptedRbac {
    async fn user_roles(&self, user_id: &UserId) -> Result<Vec<Role>, ProviderError> {
        self.role_calls.lock().unwrap().push(user_id.clone());
        let reply = self.roles.lock().unwrap().pop_front();
        match reply {
            Some(reply) => {
                tokio::time::sleep(reply.delay).await;
                reply.result
            }
            None => Ok(Vec::new()),
        }
    }

    async fn user_permissions(&self, _user_id: &UserId) -> Result<Vec<Permission>, ProviderError> {
        self.permission_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.permissions.lock().unwrap().pop_front();
        match reply {
            Some(reply) => {
                tokio::time::sleep(reply.delay).await;
                reply.result
            }
            None => Ok(Vec::new()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Harness
// ─────────────────────────────────────────────────────────────────────────────

pub struct Harness {
    pub auth: Arc<FakeAuth>,
    pub rbac: Arc<ScriptedRbac>,
    pub store: Arc<MemoryStore>,
    pub session: SessionManager,
}

impl Harness {
    pub fn new(auth: Arc<FakeAuth>, rbac: Arc<ScriptedRbac>, store: Arc<MemoryStore>) -> Self {
        Self::with_config(auth, rbac, store, SessionConfig::default())
    }

    pub fn with_config(
        auth: Arc<FakeAuth>,
        rbac: Arc<ScriptedRbac>,
        store: Arc<MemoryStore>,
        config: SessionConfig,
    ) -> Self {
        let session = SessionManager::new(auth.clone(), rbac.clone(), store.clone(), &config);
        Self {
            auth,
            rbac,
            store,
            session,
        }
    }
}

pub fn seeded_store(roles: &str, permissions: &str) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.set(ROLE_CACHE_KEY, roles).unwrap();
    store.set(PERMISSION_CACHE_KEY, permissions).unwrap();
    store
}

// ─────────────────────────────────────────────────────────────────────────────
// Stores with injected behaviour
// ─────────────────────────────────────────────────────────────────────────────

/// Reads succeed (always empty); every write fails.
#[derive(Default)]
pub struct ReadOnlyStore {
    pub failed_writes: AtomicUsize,
}

impl KeyValueStore for ReadOnlyStore {
    fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
        self.failed_writes.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Storage("disk full".into()))
    }

    fn remove(&self, _key: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Memory store whose first role write stalls the writing thread for
/// `stall`, flagging `entered` first.
pub struct StallingStore {
    pub inner: MemoryStore,
    pub entered: AtomicBool,
    stall: Duration,
}

impl StallingStore {
    pub fn new(stall: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            entered: AtomicBool::new(false),
            stall,
        })
    }
}

impl KeyValueStore for StallingStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if key == ROLE_CACHE_KEY && !self.entered.swap(true, Ordering::SeqCst) {
            std::thread::sleep(self.stall);
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.inner.remove(key)
    }
}
