use serde::{Deserialize, Serialize};

/// A fine-grained `{resource, action}` grant.
///
/// `action` is free-form on the wire; see [`PermissionAction`] for how it is
/// interpreted by the capability predicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub is_active: bool,
}

impl Permission {
    pub fn new(
        code: impl Into<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
        is_active: bool,
    ) -> Self {
        Self {
            code: code.into(),
            resource: resource.into(),
            action: action.into(),
            is_active,
        }
    }

    /// Minimal active grant carrying only a code.
    ///
    /// Used when a login payload lists permission codes but no user id to
    /// refresh against. Such grants satisfy `has_permission` but never
    /// `can_view`/`can_manage` (empty resource).
    pub fn from_code(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            resource: String::new(),
            action: String::new(),
            is_active: true,
        }
    }

    pub fn parsed_action(&self) -> PermissionAction {
        PermissionAction::parse(&self.action)
    }
}

/// Interpreted permission action. Matching is case-insensitive and does not
/// allocate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionAction {
    View,
    Manage,
    Admin,
    /// Any action the predicates do not recognise.
    Other,
}

impl PermissionAction {
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("view") {
            Self::View
        } else if raw.eq_ignore_ascii_case("manage") {
            Self::Manage
        } else if raw.eq_ignore_ascii_case("admin") {
            Self::Admin
        } else {
            Self::Other
        }
    }

    /// `view`, `manage` and `admin` all grant read access.
    pub fn grants_view(self) -> bool {
        matches!(self, Self::View | Self::Manage | Self::Admin)
    }

    pub fn grants_manage(self) -> bool {
        matches!(self, Self::Manage | Self::Admin)
    }
}

/// Drop permissions without a code.
pub fn retain_coded(permissions: Vec<Permission>) -> Vec<Permission> {
    permissions
        .into_iter()
        .filter(|p| !p.code.is_empty())
        .collect()
}
