//! Collaborator contracts: the identity provider and the RBAC service.

use async_trait::async_trait;
use thiserror::Error;

use erpdesk_auth::{Credentials, Identity, LoginResponse, Permission, Role};
use erpdesk_core::{OrganizationId, UserId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The provider refused the request (bad credentials, expired session).
    /// The message is the provider's own and is shown to the user as-is.
    #[error("{0}")]
    Rejected(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Identity provider.
///
/// Owns the session token and the current user / organization selection in
/// its own storage. The synchronous accessors read that local state and never
/// touch the network.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Exchange credentials for a session.
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, ProviderError>;

    /// Invalidate the remote session.
    async fn logout(&self) -> Result<(), ProviderError>;

    fn current_user(&self) -> Option<Identity>;

    fn current_organization_id(&self) -> Option<OrganizationId>;

    fn current_organization_name(&self) -> Option<String>;

    fn set_current_organization(&self, id: &OrganizationId, name: &str) -> Result<(), ProviderError>;
}

/// Role/permission source of truth.
#[async_trait]
pub trait RbacProvider: Send + Sync {
    async fn user_roles(&self, user_id: &UserId) -> Result<Vec<Role>, ProviderError>;

    async fn user_permissions(&self, user_id: &UserId) -> Result<Vec<Permission>, ProviderError>;
}
