//! Capability predicates over a role/permission snapshot.
//!
//! - No IO
//! - No panics
//! - Linear in the number of grants

use serde::{Deserialize, Serialize};

use crate::{Permission, RoleCode};

/// Roles and permissions currently held by a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub roles: Vec<RoleCode>,
    pub permissions: Vec<Permission>,
}

impl Capabilities {
    pub fn new(roles: Vec<RoleCode>, permissions: Vec<Permission>) -> Self {
        Self { roles, permissions }
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty() && self.permissions.is_empty()
    }

    /// Exact role-code membership.
    pub fn has_role(&self, code: &str) -> bool {
        self.roles.iter().any(|r| r.as_str() == code)
    }

    /// Exact permission-code membership (active flag is not consulted).
    pub fn has_permission(&self, code: &str) -> bool {
        self.permissions.iter().any(|p| p.code == code)
    }

    pub fn has_any_permission<I, S>(&self, codes: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        codes.into_iter().any(|c| self.has_permission(c.as_ref()))
    }

    /// Active grant on `resource` with action `view`, `manage` or `admin`.
    pub fn can_view(&self, resource: &str) -> bool {
        self.active_on(resource)
            .any(|p| p.parsed_action().grants_view())
    }

    /// Active grant on `resource` with action `manage` or `admin`.
    pub fn can_manage(&self, resource: &str) -> bool {
        self.active_on(resource)
            .any(|p| p.parsed_action().grants_manage())
    }

    /// Explain the view/manage decision for `resource`.
    ///
    /// Lists every grant naming the resource, including inactive ones, so a
    /// support screen can show why access was (not) granted.
    pub fn explain(&self, resource: &str) -> CapabilityExplanation {
        let grants = self
            .permissions
            .iter()
            .filter(|p| p.resource == resource)
            .map(|p| {
                let action = p.parsed_action();
                GrantMatch {
                    code: p.code.clone(),
                    action: p.action.clone(),
                    is_active: p.is_active,
                    grants_view: p.is_active && action.grants_view(),
                    grants_manage: p.is_active && action.grants_manage(),
                }
            })
            .collect::<Vec<_>>();

        let can_view = grants.iter().any(|g| g.grants_view);
        let can_manage = grants.iter().any(|g| g.grants_manage);

        let reason = if can_manage {
            format!("an active manage/admin grant exists on '{resource}'")
        } else if can_view {
            format!("an active view grant exists on '{resource}', but no manage/admin grant")
        } else if grants.is_empty() {
            format!("no permission names resource '{resource}'")
        } else {
            format!("grants on '{resource}' exist but none is active with a recognised action")
        };

        CapabilityExplanation {
            resource: resource.to_string(),
            can_view,
            can_manage,
            reason,
            grants,
        }
    }

    fn active_on<'a>(&'a self, resource: &'a str) -> impl Iterator<Item = &'a Permission> + 'a {
        self.permissions
            .iter()
            .filter(move |p| p.is_active && p.resource == resource)
    }
}

/// Auditable view/manage decision for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityExplanation {
    pub resource: String,
    pub can_view: bool,
    pub can_manage: bool,
    pub reason: String,
    pub grants: Vec<GrantMatch>,
}

/// One permission naming the explained resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrantMatch {
    pub code: String,
    pub action: String,
    pub is_active: bool,
    pub grants_view: bool,
    pub grants_manage: bool,
}
