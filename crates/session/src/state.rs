//! In-memory session state and its read-only snapshot.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use erpdesk_auth::{Capabilities, Identity, OrganizationSelection, Permission, RoleCode};
use erpdesk_core::OrganizationId;

use crate::sync::Ticket;

/// Lifecycle of a manager instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
}

#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub identity: Option<Identity>,
    pub organization: Option<OrganizationSelection>,
    pub capabilities: Capabilities,
    pub phase: SessionPhase,
    /// Refreshes started and not yet resolved (or invalidated).
    pub pending: BTreeSet<Ticket>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn loading(&self) -> bool {
        self.phase == SessionPhase::Initializing || !self.pending.is_empty()
    }

    /// Drop identity, organization and every grant.
    pub fn clear_session(&mut self) {
        self.identity = None;
        self.organization = None;
        self.capabilities = Capabilities::default();
        self.last_synced_at = None;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            identity: self.identity.clone(),
            organization: self.organization.clone(),
            capabilities: self.capabilities.clone(),
            phase: self.phase,
            loading: self.loading(),
            last_synced_at: self.last_synced_at,
        }
    }
}

/// Point-in-time copy of everything a screen may read from the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub identity: Option<Identity>,
    pub organization: Option<OrganizationSelection>,
    pub capabilities: Capabilities,
    pub phase: SessionPhase,
    pub loading: bool,
    /// Time of the last refresh whose result was applied.
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl SessionSnapshot {
    /// Derived from identity presence only; cached grants never
    /// authenticate.
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    pub fn organization_id(&self) -> Option<&OrganizationId> {
        self.organization.as_ref().map(|o| &o.organization_id)
    }

    pub fn organization_name(&self) -> Option<&str> {
        self.organization.as_ref().map(|o| o.organization_name.as_str())
    }

    pub fn roles(&self) -> &[RoleCode] {
        &self.capabilities.roles
    }

    pub fn permissions(&self) -> &[Permission] {
        &self.capabilities.permissions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::RefreshTickets;

    #[test]
    fn loading_tracks_phase_and_pending_refreshes() {
        let tickets = RefreshTickets::new();
        let (first, second) = (tickets.issue(), tickets.issue());
        let mut state = SessionState::default();
        assert!(!state.loading());

        state.phase = SessionPhase::Initializing;
        assert!(state.loading());

        state.phase = SessionPhase::Ready;
        state.pending.insert(first);
        state.pending.insert(second);
        assert!(state.loading());

        state.pending.remove(&first);
        assert!(state.loading());
        state.pending.remove(&second);
        state.pending.remove(&second);
        assert!(!state.loading());
    }

    #[test]
    fn cached_grants_alone_do_not_authenticate() {
        let state = SessionState {
            capabilities: Capabilities::new(vec![RoleCode::new("ADMIN")], vec![]),
            ..Default::default()
        };
        let snap = state.snapshot();
        assert!(!snap.is_authenticated());
        assert_eq!(snap.roles(), &[RoleCode::new("ADMIN")]);
    }

    #[test]
    fn clear_session_keeps_lifecycle_fields() {
        let mut state = SessionState {
            identity: Some(Identity::default()),
            phase: SessionPhase::Ready,
            pending: BTreeSet::from([RefreshTickets::new().issue()]),
            last_synced_at: Some(Utc::now()),
            ..Default::default()
        };
        state.clear_session();

        assert!(state.identity.is_none());
        assert!(state.last_synced_at.is_none());
        assert_eq!(state.phase, SessionPhase::Ready);
        assert_eq!(state.pending.len(), 1);
    }
}
