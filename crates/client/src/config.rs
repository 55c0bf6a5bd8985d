// Local configuration for the offline sync client.
//
// Config file: `~/.reposync/config.toml`
// Database: `~/.reposync/offline.db` unless overridden.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use reposync_common::protocol::worker::DEFAULT_API_BASE_URL;

use crate::flush::{FlushOptions, DEFAULT_COMMIT_MESSAGE};

pub const API_BASE_URL_ENV: &str = "REPOSYNC_API_BASE_URL";
pub const DATABASE_PATH_ENV: &str = "REPOSYNC_DATABASE_PATH";

/// Root directory for reposync state: `~/.reposync/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".reposync"))
}

/// Path to the config file: `~/.reposync/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

/// Default offline database location: `~/.reposync/offline.db`.
pub fn default_database_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("offline.db"))
}

// ── Client config ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend base URL (e.g. `https://git.example.com/api`).
    pub api_base_url: String,
    /// Offline database file. Falls back to `~/.reposync/offline.db`.
    pub database_path: Option<PathBuf>,
    pub sync: SyncSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.into(),
            database_path: None,
            sync: SyncSettings::default(),
        }
    }
}

impl ClientConfig {
    /// Load from `~/.reposync/config.toml` and apply environment overrides.
    /// A missing or unreadable file yields defaults.
    pub fn load() -> Self {
        let base =
            global_config_path().and_then(|p| Self::load_from(&p).ok()).unwrap_or_default();
        base.with_env_overrides(|key| std::env::var(key))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }

    /// Apply `REPOSYNC_*` overrides from an environment lookup.
    pub fn with_env_overrides<F>(mut self, env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        if let Ok(url) = env(API_BASE_URL_ENV) {
            self.api_base_url = url;
        }
        if let Ok(path) = env(DATABASE_PATH_ENV) {
            self.database_path = Some(PathBuf::from(path));
        }
        self
    }

    /// Check that the backend URL is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.api_base_url).map_err(|error| ConfigError::InvalidUrl {
            url: self.api_base_url.clone(),
            reason: error.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                url: self.api_base_url.clone(),
                reason: format!("unsupported scheme `{}`", url.scheme()),
            });
        }
        Ok(())
    }

    pub fn resolved_database_path(&self) -> Result<PathBuf, ConfigError> {
        self.database_path.clone().or_else(default_database_path).ok_or(ConfigError::NoHomeDir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncSettings {
    pub commit_message: String,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    /// Per-request timeout for backend calls.
    pub request_timeout_secs: u64,
    /// How often `reposync watch` pings the backend.
    pub probe_interval_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            commit_message: DEFAULT_COMMIT_MESSAGE.into(),
            author_name: None,
            author_email: None,
            request_timeout_secs: 30,
            probe_interval_secs: 15,
        }
    }
}

impl SyncSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs.max(1))
    }

    pub fn flush_options(&self) -> FlushOptions {
        FlushOptions {
            message: self.commit_message.clone(),
            author_name: self.author_name.clone(),
            author_email: self.author_email.clone(),
        }
    }
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
    InvalidUrl { url: String, reason: String },
    NoHomeDir,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Serialize(e) => write!(f, "config serialize error: {e}"),
            Self::InvalidUrl { url, reason } => write!(f, "invalid api_base_url `{url}`: {reason}"),
            Self::NoHomeDir => write!(f, "could not determine home directory"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::env::VarError;
    use tempfile::TempDir;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Result<String, VarError> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned().ok_or(VarError::NotPresent)
    }

    #[test]
    fn defaults() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.api_base_url, "http://localhost:8000");
        assert!(cfg.database_path.is_none());
        assert_eq!(cfg.sync.commit_message, "Offline edits sync");
        assert_eq!(cfg.sync.request_timeout(), Duration::from_secs(30));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let cfg = ClientConfig {
            api_base_url: "https://git.example.com/api".into(),
            database_path: Some(dir.path().join("offline.db")),
            sync: SyncSettings {
                commit_message: "Sync from laptop".into(),
                author_name: Some("Ada".into()),
                author_email: Some("ada@example.com".into()),
                request_timeout_secs: 10,
                probe_interval_secs: 5,
            },
        };
        cfg.save_to(&path).unwrap();
        assert_eq!(ClientConfig::load_from(&path).unwrap(), cfg);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let cfg: ClientConfig = toml::from_str(
            r#"
api_base_url = "https://git.example.com"

[sync]
author_name = "Bob"
"#,
        )
        .unwrap();
        assert_eq!(cfg.api_base_url, "https://git.example.com");
        assert_eq!(cfg.sync.author_name.as_deref(), Some("Bob"));
        assert_eq!(cfg.sync.request_timeout_secs, 30);

        let options = cfg.sync.flush_options();
        assert_eq!(options.message, "Offline edits sync");
        assert_eq!(options.author_name.as_deref(), Some("Bob"));
    }

    #[test]
    fn env_overrides_win_over_file() {
        let cfg = ClientConfig::default().with_env_overrides(env_from(&[
            (API_BASE_URL_ENV, "https://override.example.com"),
            (DATABASE_PATH_ENV, "/tmp/reposync-test.db"),
        ]));
        assert_eq!(cfg.api_base_url, "https://override.example.com");
        assert_eq!(cfg.database_path, Some(PathBuf::from("/tmp/reposync-test.db")));
        assert_eq!(cfg.resolved_database_path().unwrap(), PathBuf::from("/tmp/reposync-test.db"));
    }

    #[test]
    fn missing_env_leaves_config_untouched() {
        let cfg = ClientConfig::default().with_env_overrides(env_from(&[]));
        assert_eq!(cfg, ClientConfig::default());
    }

    #[test]
    fn validate_rejects_bad_urls() {
        let mut cfg = ClientConfig { api_base_url: "ftp://example.com".into(), ..Default::default() };
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidUrl { .. })));
        cfg.api_base_url = "::not a url::".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            ClientConfig::load_from(&dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn global_dir_is_under_home() {
        let dir = global_dir().unwrap();
        assert!(dir.ends_with(".reposync"));
    }
}
