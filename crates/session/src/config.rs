//! Session configuration, read from `ERPDESK_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::kv::RedbStore;

pub const API_URL_ENV: &str = "ERPDESK_API_URL";
pub const REFRESH_TIMEOUT_ENV: &str = "ERPDESK_REFRESH_TIMEOUT_MS";
pub const CACHE_PATH_ENV: &str = "ERPDESK_CACHE_PATH";

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_REFRESH_TIMEOUT_MS: u64 = 15_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var} ({value:?}): {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Base URL of the REST backend, without trailing slash.
    pub api_url: String,
    /// Upper bound for one role+permission refresh.
    pub refresh_timeout_ms: u64,
    /// Location of the on-disk session store. `None` means the platform
    /// default (see [`RedbStore::default_path`]).
    pub cache_path: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            refresh_timeout_ms: DEFAULT_REFRESH_TIMEOUT_MS,
            cache_path: None,
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup; unset or blank variables take
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(url) = get(API_URL_ENV) {
            config.api_url = url.trim().trim_end_matches('/').to_string();
        }

        if let Some(raw) = get(REFRESH_TIMEOUT_ENV) {
            config.refresh_timeout_ms =
                raw.trim()
                    .parse::<u64>()
                    .map_err(|_| ConfigError::InvalidValue {
                        var: REFRESH_TIMEOUT_ENV,
                        value: raw.clone(),
                        reason: "expected a whole number of milliseconds",
                    })?;
        }

        if let Some(path) = get(CACHE_PATH_ENV) {
            config.cache_path = Some(PathBuf::from(path));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                var: API_URL_ENV,
                value: self.api_url.clone(),
                reason: "expected an http:// or https:// URL",
            });
        }
        if self.refresh_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                var: REFRESH_TIMEOUT_ENV,
                value: "0".to_string(),
                reason: "timeout must be positive",
            });
        }
        Ok(())
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX).max(1);
        self
    }

    /// Resolve the session store path, falling back to the platform default.
    pub fn resolve_cache_path(&self) -> anyhow::Result<PathBuf> {
        match &self.cache_path {
            Some(path) => Ok(path.clone()),
            None => RedbStore::default_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = SessionConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.refresh_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn reads_and_normalises_variables() {
        let config = SessionConfig::from_lookup(lookup(&[
            (API_URL_ENV, "https://erp.example.com/api/ "),
            (REFRESH_TIMEOUT_ENV, "2500"),
            (CACHE_PATH_ENV, "/tmp/erpdesk.redb"),
        ]))
        .unwrap();

        assert_eq!(config.api_url, "https://erp.example.com/api");
        assert_eq!(config.refresh_timeout(), Duration::from_millis(2500));
        assert_eq!(config.resolve_cache_path().unwrap(), PathBuf::from("/tmp/erpdesk.redb"));
    }

    #[test]
    fn rejects_bad_values() {
        let err = SessionConfig::from_lookup(lookup(&[(REFRESH_TIMEOUT_ENV, "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var: REFRESH_TIMEOUT_ENV, .. }));

        assert!(SessionConfig::from_lookup(lookup(&[(REFRESH_TIMEOUT_ENV, "0")])).is_err());
        assert!(SessionConfig::from_lookup(lookup(&[(API_URL_ENV, "localhost:8080")])).is_err());
    }

    #[test]
    fn with_refresh_timeout_never_yields_zero() {
        let config = SessionConfig::default().with_refresh_timeout(Duration::from_micros(10));
        assert_eq!(config.refresh_timeout_ms, 1);
    }
}
