//! REST-backed identity and RBAC providers.
//!
//! Both providers share one [`KeyValueStore`]: the auth provider writes the
//! bearer token and the current user / organization under its own keys, the
//! RBAC provider reads the token from there. Neither touches the session
//! cache keys.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use erpdesk_auth::{Credentials, Identity, LoginResponse, Permission, Role};
use erpdesk_core::{OrganizationId, UserId};

use crate::kv::KeyValueStore;
use crate::provider::{AuthProvider, ProviderError, RbacProvider};

pub const AUTH_TOKEN_KEY: &str = "auth_token";
pub const AUTH_USER_KEY: &str = "auth_user";
pub const ORGANIZATION_ID_KEY: &str = "current_organization_id";
pub const ORGANIZATION_NAME_KEY: &str = "current_organization_name";

/// Identity provider talking to `POST /auth/login` and `POST /auth/logout`.
pub struct HttpAuthProvider {
    client: reqwest::Client,
    api_url: String,
    store: Arc<dyn KeyValueStore>,
}

impl HttpAuthProvider {
    pub fn new(api_url: impl Into<String>, store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url, store)
    }

    pub fn with_client(
        client: reqwest::Client,
        api_url: impl Into<String>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            store,
        }
    }

    pub fn token(&self) -> Option<String> {
        read_key(self.store.as_ref(), AUTH_TOKEN_KEY)
    }

    fn persist_login(&self, response: &LoginResponse) -> Result<(), ProviderError> {
        let store = self.store.as_ref();
        let saved = match &response.token {
            Some(token) => store.set(AUTH_TOKEN_KEY, token),
            None => store.remove(AUTH_TOKEN_KEY),
        };
        saved.map_err(storage)?;

        let user = serde_json::to_string(&response.identity())
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        store.set(AUTH_USER_KEY, &user).map_err(storage)?;

        // Default organization from the login payload, if the backend sent one.
        if let Some(org_id) = &response.organization_id {
            store.set(ORGANIZATION_ID_KEY, org_id.as_str()).map_err(storage)?;
            store
                .set(
                    ORGANIZATION_NAME_KEY,
                    response.organization_name.as_deref().unwrap_or_default(),
                )
                .map_err(storage)?;
        }
        Ok(())
    }

    fn forget_session(&self) {
        for key in [AUTH_TOKEN_KEY, AUTH_USER_KEY, ORGANIZATION_ID_KEY, ORGANIZATION_NAME_KEY] {
            if let Err(e) = self.store.remove(key) {
                tracing::warn!(key, error = %e, "failed to remove auth provider key");
            }
        }
    }
}

#[async_trait]
impl AuthProvider for HttpAuthProvider {
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, ProviderError> {
        let url = format!("{}/auth/login", self.api_url);
        let response: LoginResponse = send_json(self.client.post(&url).json(credentials)).await?;
        self.persist_login(&response)?;
        Ok(response)
    }

    async fn logout(&self) -> Result<(), ProviderError> {
        let url = format!("{}/auth/logout", self.api_url);
        let mut req = self.client.post(&url);
        if let Some(token) = self.token() {
            req = req.bearer_auth(token);
        }

        let result = send_empty(req).await;
        // The local session ends whether or not the backend acknowledged it.
        self.forget_session();
        result
    }

    fn current_user(&self) -> Option<Identity> {
        let raw = read_key(self.store.as_ref(), AUTH_USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(identity) => Some(identity),
            Err(e) => {
                tracing::warn!(error = %e, "stored user is malformed; treating as signed out");
                None
            }
        }
    }

    fn current_organization_id(&self) -> Option<OrganizationId> {
        read_key(self.store.as_ref(), ORGANIZATION_ID_KEY)
            .filter(|v| !v.is_empty())
            .map(OrganizationId::from)
    }

    fn current_organization_name(&self) -> Option<String> {
        read_key(self.store.as_ref(), ORGANIZATION_NAME_KEY)
    }

    fn set_current_organization(&self, id: &OrganizationId, name: &str) -> Result<(), ProviderError> {
        self.store.set(ORGANIZATION_ID_KEY, id.as_str()).map_err(storage)?;
        self.store.set(ORGANIZATION_NAME_KEY, name).map_err(storage)
    }
}

/// RBAC provider talking to `GET /rbac/users/{id}/roles|permissions`.
pub struct HttpRbacProvider {
    client: reqwest::Client,
    api_url: String,
    store: Arc<dyn KeyValueStore>,
}

impl HttpRbacProvider {
    pub fn new(api_url: impl Into<String>, store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url, store)
    }

    pub fn with_client(
        client: reqwest::Client,
        api_url: impl Into<String>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            store,
        }
    }

    fn get(&self, user_id: &UserId, collection: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/rbac/users/{}/{}", self.api_url, user_id, collection);
        let req = self.client.get(&url);
        match read_key(self.store.as_ref(), AUTH_TOKEN_KEY) {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait]
impl RbacProvider for HttpRbacProvider {
    async fn user_roles(&self, user_id: &UserId) -> Result<Vec<Role>, ProviderError> {
        send_json(self.get(user_id, "roles")).await
    }

    async fn user_permissions(&self, user_id: &UserId) -> Result<Vec<Permission>, ProviderError> {
        send_json(self.get(user_id, "permissions")).await
    }
}

async fn send(req: reqwest::RequestBuilder) -> Result<reqwest::Response, ProviderError> {
    let resp = req
        .send()
        .await
        .map_err(|e| ProviderError::Network(e.to_string()))?;

    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let message = resp.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        let message = if message.trim().is_empty() {
            status.canonical_reason().unwrap_or("unauthorized").to_string()
        } else {
            message
        };
        return Err(ProviderError::Rejected(message));
    }

    Err(ProviderError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn send_json<T: DeserializeOwned>(req: reqwest::RequestBuilder) -> Result<T, ProviderError> {
    send(req)
        .await?
        .json()
        .await
        .map_err(|e| ProviderError::Parse(e.to_string()))
}

async fn send_empty(req: reqwest::RequestBuilder) -> Result<(), ProviderError> {
    send(req).await.map(|_| ())
}

fn read_key(store: &dyn KeyValueStore, key: &str) -> Option<String> {
    match store.get(key) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(key, error = %e, "failed to read auth provider key");
            None
        }
    }
}

fn storage(e: crate::kv::StoreError) -> ProviderError {
    ProviderError::Storage(e.to_string())
}
