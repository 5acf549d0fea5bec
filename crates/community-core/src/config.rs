//! Application configuration management.
//!
//! This module handles loading and saving the client configuration, which
//! includes the backend URL, request timeout, credential storage backend and
//! last used username.
//!
//! Configuration is stored at `~/.config/community/config.json`.
//! `COMMUNITY_API_URL` overrides the configured backend URL and
//! `COMMUNITY_USERNAME` overrides the remembered username.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::client::{DEFAULT_BASE_URL, REQUEST_TIMEOUT_SECS};
use crate::api::ApiClientBuilder;
use crate::auth::{CredentialStore, FileStore, KeyringStore, MemoryStore, SessionManager};

/// Application name used for config/data directory paths
const APP_NAME: &str = "community";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the backend URL
pub const API_URL_ENV: &str = "COMMUNITY_API_URL";

/// Environment variable pre-filling the login username
pub const USERNAME_ENV: &str = "COMMUNITY_USERNAME";

/// Where session credentials are persisted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// JSON file in the data directory
    #[default]
    File,
    /// OS keychain
    Keyring,
    /// Nothing survives the process
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub store: StoreBackend,
    pub last_username: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the credential file and logs
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Backend URL: environment override, then config, then the default
    pub fn api_base_url(&self) -> String {
        std::env::var(API_URL_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    /// Username to offer at the login prompt
    pub fn default_username(&self) -> Option<String> {
        std::env::var(USERNAME_ENV)
            .ok()
            .filter(|name| !name.trim().is_empty())
            .or_else(|| self.last_username.clone())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(REQUEST_TIMEOUT_SECS))
    }

    /// Open the configured credential store
    pub fn open_store(&self) -> Result<Arc<dyn CredentialStore>> {
        let store: Arc<dyn CredentialStore> = match self.store {
            StoreBackend::File => Arc::new(FileStore::new(self.data_dir()?)),
            StoreBackend::Keyring if KeyringStore::is_supported() => Arc::new(KeyringStore::new()),
            StoreBackend::Keyring => {
                anyhow::bail!("No OS keychain on this platform; use the \"file\" store")
            }
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
        };
        Ok(store)
    }

    pub fn client_builder(&self) -> Result<ApiClientBuilder> {
        let store = self.open_store()?;
        Ok(ApiClientBuilder::new(self.api_base_url(), store).timeout(self.timeout()))
    }

    /// Build a session manager wired to the configured backend and store
    pub fn session_manager(&self) -> Result<SessionManager> {
        SessionManager::new(self.client_builder()?).context("Failed to create API client")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();

        assert_eq!(config.store, StoreBackend::File);
        assert_eq!(config.timeout(), Duration::from_secs(REQUEST_TIMEOUT_SECS));
        assert!(config.last_username.is_none());
    }

    #[test]
    fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            base_url: Some("https://forum.example.com/api".to_string()),
            timeout_secs: Some(30),
            store: StoreBackend::Keyring,
            last_username: Some("kim".to_string()),
        };

        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();

        assert_eq!(loaded.base_url, config.base_url);
        assert_eq!(loaded.store, StoreBackend::Keyring);
        assert_eq!(loaded.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_store_backend_parses_lowercase() {
        let config: Config = serde_json::from_str(r#"{"store":"memory"}"#).unwrap();
        assert_eq!(config.store, StoreBackend::Memory);
    }

    #[test]
    fn test_keyring_backend_only_offered_with_native_keychain() {
        let config = Config {
            store: StoreBackend::Keyring,
            ..Config::default()
        };
        assert_eq!(config.open_store().is_ok(), KeyringStore::is_supported());
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ nope").unwrap();

        assert!(Config::load_from(&path).is_err());
    }
}
