use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role code used for RBAC (e.g. `"ADMIN"`).
///
/// Roles are flat and opaque at this layer; checks are exact string matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleCode(Cow<'static, str>);

impl RoleCode {
    pub fn new(code: impl Into<Cow<'static, str>>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for RoleCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RoleCode {
    fn from(value: String) -> Self {
        Self(Cow::Owned(value))
    }
}

impl From<&'static str> for RoleCode {
    fn from(value: &'static str) -> Self {
        Self(Cow::Borrowed(value))
    }
}

/// Role record as returned by the RBAC service.
///
/// The service may return rows without a code; those are dropped by
/// [`role_codes`] during reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    #[serde(default)]
    pub code: Option<String>,
}

impl Role {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
        }
    }
}

/// Project remote role records onto their codes, dropping blank ones.
pub fn role_codes(roles: &[Role]) -> Vec<RoleCode> {
    roles
        .iter()
        .filter_map(|r| r.code.as_deref())
        .filter(|c| !c.is_empty())
        .map(|c| RoleCode::from(c.to_string()))
        .collect()
}
