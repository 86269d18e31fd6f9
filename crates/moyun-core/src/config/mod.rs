//! Engine and remote configuration.
//!
//! `EngineConfig` carries the tunable policies (backup retention, liveness
//! window, autosave pacing). `RemoteConfig` describes how to reach the remote
//! store. Secret credentials are redacted from `Debug` output.

use std::env;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::remote::{RemoteError, RemoteResult};
use crate::util::{is_http_url, normalize_text_option, DAY_MS, HOUR_MS};

const ENV_DATABASE_URL: &str = "MOYUN_DATABASE_URL";
const ENV_AUTH_TOKEN: &str = "MOYUN_AUTH_TOKEN";
const ENV_TIMEOUT_SECS: &str = "MOYUN_REMOTE_TIMEOUT_SECS";

const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Tunable engine policies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Backups older than this are pruned after an auto-backup
    pub backup_retention_days: u32,
    /// Minimum spacing between automatic backups
    pub auto_backup_interval_hours: u32,
    /// Devices seen within this window count as active
    pub device_liveness_days: u32,
    /// Minimum spacing between autosave flushes of the same entity
    pub autosave_min_interval_ms: u64,
    /// Free-form description stored with each heartbeat
    pub client_descriptor: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backup_retention_days: 3,
            auto_backup_interval_hours: 24,
            device_liveness_days: 7,
            autosave_min_interval_ms: 2000,
            client_descriptor: crate::clock::default_client_descriptor(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn backup_retention_ms(&self) -> i64 {
        i64::from(self.backup_retention_days) * DAY_MS
    }

    #[must_use]
    pub fn auto_backup_interval_ms(&self) -> i64 {
        i64::from(self.auto_backup_interval_hours) * HOUR_MS
    }

    #[must_use]
    pub fn device_liveness_ms(&self) -> i64 {
        i64::from(self.device_liveness_days) * DAY_MS
    }
}

/// How to reach the remote store
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub database_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl RemoteConfig {
    #[must_use]
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            auth_token: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Load from `MOYUN_*` environment variables.
    ///
    /// Returns `Ok(None)` when no database URL is set.
    pub fn from_env() -> RemoteResult<Option<Self>> {
        Self::from_lookup(|key| env::var(key).ok(), None)
    }

    /// Load from a variable lookup, using `fallback_url` when no database
    /// URL variable is set. The token and timeout still come from `lookup`.
    pub fn from_lookup<F>(lookup: F, fallback_url: Option<String>) -> RemoteResult<Option<Self>>
    where
        F: Fn(&str) -> Option<String>,
    {
        parse_config(lookup, fallback_url)
    }

    /// Database URL with a checked scheme and no trailing slash.
    pub fn normalized_database_url(&self) -> RemoteResult<String> {
        let Some(url) = normalize_text_option(Some(self.database_url.clone())) else {
            return Err(RemoteError::InvalidConfiguration(
                "database URL must not be empty".to_string(),
            ));
        };
        if !is_http_url(&url) {
            return Err(RemoteError::InvalidConfiguration(format!(
                "database URL must include http:// or https:// (got {url})"
            )));
        }
        Ok(url.trim_end_matches('/').to_string())
    }
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RemoteConfig")
            .field("database_url", &self.database_url)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn parse_config<F>(lookup: F, fallback_url: Option<String>) -> RemoteResult<Option<RemoteConfig>>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(database_url) = normalize_text_option(lookup(ENV_DATABASE_URL))
        .or_else(|| normalize_text_option(fallback_url))
    else {
        return Ok(None);
    };

    let timeout_secs = match normalize_text_option(lookup(ENV_TIMEOUT_SECS)) {
        Some(raw) => raw.parse::<u64>().map_err(|_| {
            RemoteError::InvalidConfiguration(format!(
                "{ENV_TIMEOUT_SECS} must be a whole number of seconds (got {raw})"
            ))
        })?,
        None => DEFAULT_TIMEOUT_SECS,
    };

    let config = RemoteConfig {
        database_url,
        auth_token: normalize_text_option(lookup(ENV_AUTH_TOKEN)),
        timeout_secs,
    };
    config.normalized_database_url()?;
    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn engine_defaults_match_policy() {
        let config = EngineConfig::default();
        assert_eq!(config.backup_retention_days, 3);
        assert_eq!(config.auto_backup_interval_ms(), 24 * HOUR_MS);
        assert_eq!(config.device_liveness_ms(), 7 * DAY_MS);
        assert_eq!(config.autosave_min_interval_ms, 2000);
    }

    #[test]
    fn engine_config_fills_missing_fields_from_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"backup_retention_days": 10}"#).unwrap();
        assert_eq!(config.backup_retention_days, 10);
        assert_eq!(config.device_liveness_days, 7);
    }

    #[test]
    fn parse_config_returns_none_without_url() {
        assert!(parse_config(lookup(&[]), None).unwrap().is_none());
        assert!(parse_config(lookup(&[(ENV_DATABASE_URL, "  ")]), None)
            .unwrap()
            .is_none());
    }

    #[test]
    fn parse_config_reads_all_fields() {
        let vars = lookup(&[
            (ENV_DATABASE_URL, "https://moyun.example.com/"),
            (ENV_AUTH_TOKEN, "token"),
            (ENV_TIMEOUT_SECS, "30"),
        ]);
        let config = parse_config(vars, None).unwrap().unwrap();

        assert_eq!(config.auth_token.as_deref(), Some("token"));
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(
            config.normalized_database_url().unwrap(),
            "https://moyun.example.com"
        );
    }

    #[test]
    fn fallback_url_is_used_only_without_variable() {
        let config = RemoteConfig::from_lookup(
            lookup(&[(ENV_AUTH_TOKEN, "token")]),
            Some("https://profile.example.com".to_string()),
        )
        .unwrap()
        .unwrap();
        assert_eq!(config.database_url, "https://profile.example.com");
        assert_eq!(config.auth_token.as_deref(), Some("token"));

        let config = RemoteConfig::from_lookup(
            lookup(&[(ENV_DATABASE_URL, "https://env.example.com")]),
            Some("https://profile.example.com".to_string()),
        )
        .unwrap()
        .unwrap();
        assert_eq!(config.database_url, "https://env.example.com");
    }

    #[test]
    fn parse_config_rejects_bad_values() {
        let no_scheme = lookup(&[(ENV_DATABASE_URL, "moyun.example.com")]);
        assert!(parse_config(no_scheme, None).is_err());

        let bad_timeout = lookup(&[
            (ENV_DATABASE_URL, "https://moyun.example.com"),
            (ENV_TIMEOUT_SECS, "soon"),
        ]);
        assert!(parse_config(bad_timeout, None).is_err());
    }

    #[test]
    fn debug_redacts_token() {
        let mut config = RemoteConfig::new("https://moyun.example.com");
        config.auth_token = Some("hunter2".to_string());
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }
}
