//! Deployment configuration, resolved once at startup and passed in.
//!
//! Stored as JSON; every field has a default so a missing or partial file
//! still produces a working local setup. A handful of environment variables
//! override the file for container deployments.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::DocumentPath;

pub const CONFIG_ENV: &str = "MOODBOARD_CONFIG";
pub const INITIAL_AUTH_TOKEN_ENV: &str = "MOODBOARD_INITIAL_AUTH_TOKEN";
pub const PORT_ENV: &str = "MOODBOARD_PORT";
pub const API_KEY_ENV: &str = "MOODBOARD_API_KEY";

/// Which identity provider the session bootstrapper talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityBackend {
    /// In-process provider; never unreachable.
    Local,
    /// Identity-Toolkit-style REST API.
    Rest,
}

/// Which document store backs the content record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_identity_backend")]
    pub provider: IdentityBackend,
    /// Web API key for the REST provider.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_auth_base_url")]
    pub auth_base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_identity_backend() -> IdentityBackend {
    IdentityBackend::Local
}
fn default_auth_base_url() -> String {
    "https://identitytoolkit.googleapis.com".into()
}
fn default_timeout_secs() -> u64 {
    10
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            provider: default_identity_backend(),
            api_key: None,
            auth_base_url: default_auth_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackend,
    /// SQLite file; defaults to `moodboard.db` in the app data directory.
    #[serde(default)]
    pub database_path: Option<String>,
}

fn default_store_backend() -> StoreBackend {
    StoreBackend::Sqlite
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            database_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Mounted views kept alive at once; the oldest is torn down past this.
    #[serde(default = "default_max_views")]
    pub max_views: usize,
    /// How long a page render waits for the view's first snapshot.
    #[serde(default = "default_first_load_wait_ms")]
    pub first_load_wait_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8080
}
fn default_max_views() -> usize {
    64
}
fn default_first_load_wait_ms() -> u64 {
    1500
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_views: default_max_views(),
            first_load_wait_ms: default_first_load_wait_ms(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Deployment identifier, used to build the default document path.
    #[serde(default = "default_app_id")]
    pub app_id: String,
    /// Full document path override, e.g. `content/main`.
    #[serde(default)]
    pub document_path: Option<String>,
    /// Custom token for non-anonymous sign-in.
    #[serde(default)]
    pub initial_auth_token: Option<String>,
    /// Handle shown in the page header.
    #[serde(default = "default_display_name")]
    pub display_name: String,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
    /// `tracing` filter directive; `RUST_LOG` takes precedence.
    #[serde(default)]
    pub log_filter: Option<String>,
}

fn default_app_id() -> String {
    "moodboard-grignute".into()
}
fn default_display_name() -> String {
    "@Grignute".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_id: default_app_id(),
            document_path: None,
            initial_auth_token: None,
            display_name: default_display_name(),
            identity: IdentityConfig::default(),
            store: StoreConfig::default(),
            server: ServerConfig::default(),
            log_filter: None,
        }
    }
}

/// Get the app data directory.
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("com.moodboard.app")
}

/// Config file location: `$MOODBOARD_CONFIG`, else `config.json` in the data dir.
pub fn config_path() -> PathBuf {
    std::env::var(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| app_data_dir().join("config.json"))
}

impl AppConfig {
    /// Load config from a JSON file. Returns defaults if the file doesn't exist.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file: {}; using defaults", e);
                Self::default()
            }),
            Err(_) => {
                tracing::info!("No config file at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Save config to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!("Config saved to {}", path.display());
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(INITIAL_AUTH_TOKEN_ENV) {
            self.initial_auth_token = Some(token);
        }
        if let Some(key) = lookup(API_KEY_ENV) {
            self.identity.api_key = Some(key);
        }
        if let Some(port) = lookup(PORT_ENV) {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(e) => tracing::warn!("Invalid {} value '{}': {}", PORT_ENV, port, e),
            }
        }
    }

    /// Path of the shared content document.
    pub fn content_path(&self) -> Result<DocumentPath> {
        match &self.document_path {
            Some(path) => DocumentPath::parse(path),
            None => DocumentPath::parse(&format!(
                "artifacts/{}/public/data/site/content",
                self.app_id
            )),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.store
            .database_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| app_data_dir().join("moodboard.db"))
    }

    /// Initial token, ignoring blank values.
    pub fn initial_token(&self) -> Option<&str> {
        self.initial_auth_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.app_id, "moodboard-grignute");
        assert_eq!(config.identity.provider, IdentityBackend::Local);
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.server.port, 8080);
        assert!(config.initial_token().is_none());
    }

    #[test]
    fn test_default_content_path() {
        let config = AppConfig::default();
        assert_eq!(
            config.content_path().unwrap().as_str(),
            "artifacts/moodboard-grignute/public/data/site/content"
        );
    }

    #[test]
    fn test_content_path_override() {
        let config = AppConfig {
            document_path: Some("content/main".into()),
            ..Default::default()
        };
        assert_eq!(config.content_path().unwrap().as_str(), "content/main");

        let bad = AppConfig {
            document_path: Some("content".into()),
            ..Default::default()
        };
        assert!(bad.content_path().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let tmp = std::env::temp_dir().join("moodboard_test_config.json");
        let config = AppConfig {
            app_id: "demo".into(),
            server: ServerConfig {
                port: 9191,
                ..Default::default()
            },
            ..Default::default()
        };
        config.save(&tmp).unwrap();

        let loaded = AppConfig::load(&tmp);
        assert_eq!(loaded.app_id, "demo");
        assert_eq!(loaded.server.port, 9191);
        assert_eq!(loaded.server.max_views, 64);

        let _ = std::fs::remove_file(&tmp);
    }

    #[test]
    fn test_load_missing_file() {
        let config = AppConfig::load(&PathBuf::from("/nonexistent/config.json"));
        assert_eq!(config.app_id, "moodboard-grignute");
    }

    #[test]
    fn test_partial_file_uses_field_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"identity": {"provider": "rest"}}"#).unwrap();
        assert_eq!(config.identity.provider, IdentityBackend::Rest);
        assert_eq!(config.identity.timeout_secs, 10);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (INITIAL_AUTH_TOKEN_ENV, "owner-token"),
            (PORT_ENV, "3000"),
            (API_KEY_ENV, "key-123"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.initial_token(), Some("owner-token"));
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.identity.api_key.as_deref(), Some("key-123"));
    }

    #[test]
    fn test_invalid_port_override_is_ignored() {
        let mut config = AppConfig::default();
        config.apply_overrides(|k| (k == PORT_ENV).then(|| "not-a-port".to_string()));
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_blank_initial_token_is_ignored() {
        let config = AppConfig {
            initial_auth_token: Some("   ".into()),
            ..Default::default()
        };
        assert!(config.initial_token().is_none());
    }
}
