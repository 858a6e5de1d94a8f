//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! how to reach the API, where credentials are kept, and the last email
//! used to log in.
//!
//! Configuration is stored at `~/.config/carelink/config.json`; the
//! `CARELINK_API_URL`, `CARELINK_TIMEOUT_MS` and `CARELINK_STORE`
//! environment variables override the file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::{
    AuthEndpoints, ClientOptions, ConfiguredResolver, ProbeResolver, StaticResolver,
    DEFAULT_TIMEOUT_MS,
};
use crate::auth::{CredentialStore, FileStore, KeyringStore, MemoryStore, Session, StorageKeys};
use crate::messaging::DEFAULT_POLL_INTERVAL_SECS;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "carelink";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Health probe timeout in milliseconds.
/// Short, since unreachable candidates are expected during discovery.
const DEFAULT_PROBE_TIMEOUT_MS: u64 = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    File,
    Keyring,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(StoreBackend::File),
            "keyring" => Ok(StoreBackend::Keyring),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(anyhow::anyhow!("Unknown credential store '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fixed API base URL; when unset the discovery candidates are probed
    pub api_url: Option<String>,
    pub discovery_candidates: Vec<String>,
    pub health_path: String,
    pub timeout_ms: u64,
    pub probe_timeout_ms: u64,
    pub store: StoreBackend,
    pub keys: StorageKeys,
    pub endpoints: AuthEndpoints,
    pub poll_interval_secs: u64,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: None,
            discovery_candidates: vec![
                "http://localhost:5000".to_string(),
                "http://10.0.2.2:5000".to_string(),
                "http://127.0.0.1:5000".to_string(),
            ],
            health_path: "/api/health".to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            store: StoreBackend::default(),
            keys: StorageKeys::default(),
            endpoints: AuthEndpoints::default(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            last_email: None,
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
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

    /// Apply `CARELINK_*` overrides from the given lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("CARELINK_API_URL").filter(|u| !u.trim().is_empty()) {
            self.api_url = Some(url.trim().to_string());
        }
        if let Some(timeout) = lookup("CARELINK_TIMEOUT_MS") {
            self.timeout_ms = timeout
                .trim()
                .parse()
                .with_context(|| format!("Invalid CARELINK_TIMEOUT_MS '{}'", timeout))?;
        }
        if let Some(store) = lookup("CARELINK_STORE") {
            self.store = store.parse()?;
        }
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            timeout: Duration::from_millis(self.timeout_ms),
            endpoints: self.endpoints.clone(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn resolver(&self) -> Result<ConfiguredResolver> {
        match self.api_url {
            Some(ref url) => Ok(ConfiguredResolver::Static(StaticResolver::new(url.clone()))),
            None => {
                let probe = ProbeResolver::new(
                    self.discovery_candidates.clone(),
                    &self.health_path,
                    Duration::from_millis(self.probe_timeout_ms),
                )?;
                Ok(ConfiguredResolver::Probe(probe))
            }
        }
    }

    pub fn credential_store(&self) -> Result<Arc<dyn CredentialStore>> {
        let store: Arc<dyn CredentialStore> = match self.store {
            StoreBackend::File => Arc::new(FileStore::new(&self.cache_dir()?)),
            StoreBackend::Keyring => Arc::new(KeyringStore::new()),
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
        };
        Ok(store)
    }

    pub fn session(&self) -> Result<Session> {
        Ok(Session::new(self.credential_store()?, self.keys.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.store, StoreBackend::File);
        assert!(config.api_url.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"api_url":"https://api.carelink.example","store":"keyring"}"#)
            .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.api_url.as_deref(), Some("https://api.carelink.example"));
        assert_eq!(config.store, StoreBackend::Keyring);
        assert_eq!(config.endpoints.refresh, "/api/auth/refresh-token");
        assert_eq!(config.keys.access_token, "accessToken");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = Config {
            last_email: Some("ana@example.com".to_string()),
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.last_email.as_deref(), Some("ana@example.com"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("CARELINK_API_URL", "http://192.168.1.20:5000"),
            ("CARELINK_TIMEOUT_MS", "2500"),
            ("CARELINK_STORE", "Memory"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.api_url.as_deref(), Some("http://192.168.1.20:5000"));
        assert_eq!(config.client_options().timeout, Duration::from_millis(2500));
        assert_eq!(config.store, StoreBackend::Memory);
        assert!(matches!(config.resolver().unwrap(), ConfiguredResolver::Static(_)));
    }

    #[test]
    fn test_invalid_env_override() {
        let mut config = Config::default();
        assert!(config
            .apply_env(|key| (key == "CARELINK_TIMEOUT_MS").then(|| "soon".to_string()))
            .is_err());
        assert!(config
            .apply_env(|key| (key == "CARELINK_STORE").then(|| "floppy".to_string()))
            .is_err());
    }

    #[test]
    fn test_resolver_probes_without_api_url() {
        let config = Config::default();
        match config.resolver().unwrap() {
            ConfiguredResolver::Probe(probe) => assert_eq!(probe.candidates().len(), 3),
            ConfiguredResolver::Static(_) => panic!("expected probe resolver"),
        }
    }
}
