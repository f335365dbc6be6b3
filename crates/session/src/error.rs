use thiserror::Error;

use crate::provider::ProviderError;

/// Errors surfaced to callers of [`crate::SessionManager`] actions.
///
/// Refresh and cache failures never appear here; they degrade to stale
/// state and are reported through [`crate::RefreshOutcome`] instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The identity provider rejected or failed the login. Nothing was
    /// committed.
    #[error("login failed: {0}")]
    Login(#[source] ProviderError),

    /// The provider could not record the organization switch.
    #[error("failed to switch organization: {0}")]
    Organization(#[source] ProviderError),
}

impl SessionError {
    /// Message suitable for display (the provider's own wording for
    /// rejected logins).
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Login(ProviderError::Rejected(msg)) => msg.clone(),
            other => other.to_string(),
        }
    }
}
