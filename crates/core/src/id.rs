//! Strongly-typed identifiers used across the client.
//!
//! The backend hands out opaque string ids, so these wrap `String` rather
//! than a UUID.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of an authenticated user, as issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

/// Identifier of an organization in the external organization catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizationId(String);

macro_rules! impl_string_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Wrap an id without validation (trusted input, e.g. a payload
            /// that already went through serde).
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $t {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $t {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err(DomainError::invalid_id(format!("{}: empty", $name)));
                }
                Ok(Self(trimmed.to_string()))
            }
        }
    };
}

impl_string_newtype!(UserId, "UserId");
impl_string_newtype!(OrganizationId, "OrganizationId");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_blank_ids() {
        assert_eq!(
            "   ".parse::<UserId>(),
            Err(DomainError::InvalidId("UserId: empty".to_string()))
        );
        assert!("".parse::<OrganizationId>().is_err());
    }

    #[test]
    fn parse_trims_surrounding_whitespace() {
        let id: UserId = " u1 ".parse().unwrap();
        assert_eq!(id.as_str(), "u1");
    }

    #[test]
    fn serializes_as_bare_string() {
        let id = OrganizationId::new("org-7");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"org-7\"");

        let back: OrganizationId = serde_json::from_str("\"org-7\"").unwrap();
        assert_eq!(back, id);
    }
}
