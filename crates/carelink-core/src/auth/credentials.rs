//! Key-value credential storage backends.
//!
//! The authenticated client only needs get/set/remove by key; where the
//! values live is decided by the application through [`CredentialStore`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use keyring::Entry;
use thiserror::Error;

/// Keychain service name for [`KeyringStore`]
const SERVICE_NAME: &str = "carelink";

/// Credentials file name in cache directory
const CREDENTIALS_FILE: &str = "credentials.json";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt credentials file: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Credential store lock poisoned")]
    Poisoned,

    /// A failure raised during a shared token refresh, reported to every
    /// caller that joined it.
    #[error("{0}")]
    Reported(String),
}

/// Persistent key-value store holding tokens and the cached user record.
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removing a key that is not present is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let values = self.values.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock().map_err(|_| StoreError::Poisoned)?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock().map_err(|_| StoreError::Poisoned)?;
        values.remove(key);
        Ok(())
    }
}

/// Stores all keys in a single JSON object on disk.
///
/// The file is created on first write and deleted once the last key is
/// removed, so a logged-out user leaves nothing behind.
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            path: cache_dir.join(CREDENTIALS_FILE),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<HashMap<String, String>, StoreError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let contents = std::fs::read_to_string(&self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_all(&self, values: &HashMap<String, String>) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if values.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path).map_err(io_err)?;
            }
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let contents = serde_json::to_string_pretty(values)?;
        std::fs::write(&self.path, contents).map_err(io_err)
    }
}

impl CredentialStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut values = self.read_all()?;
        values.insert(key.to_string(), value.to_string());
        self.write_all(&values)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut values = self.read_all()?;
        if values.remove(key).is_some() {
            self.write_all(&values)?;
        }
        Ok(())
    }
}

/// OS keychain store, one entry per key.
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, StoreError> {
        Ok(Entry::new(&self.service, key)?)
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        Ok(self.entry(key)?.set_password(value)?)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert_eq!(store.get("accessToken").unwrap(), None);

        store.set("accessToken", "abc").unwrap();
        assert_eq!(store.get("accessToken").unwrap().as_deref(), Some("abc"));

        store.set("accessToken", "def").unwrap();
        assert_eq!(store.get("accessToken").unwrap().as_deref(), Some("def"));

        store.remove("accessToken").unwrap();
        assert_eq!(store.get("accessToken").unwrap(), None);

        // Removing twice is fine
        store.remove("accessToken").unwrap();
    }

    #[test]
    fn test_keyring_store_round_trip() {
        let store = KeyringStore::with_service("carelink-test-round-trip");
        if let Err(e) = store.set("accessToken", "abc") {
            eprintln!("Skipping keyring round trip, no platform keychain: {}", e);
            return;
        }

        // Fresh handle, so the value has to come from the keychain
        let reopened = KeyringStore::with_service("carelink-test-round-trip");
        assert_eq!(reopened.get("accessToken").unwrap().as_deref(), Some("abc"));

        reopened.remove("accessToken").unwrap();
        assert_eq!(store.get("accessToken").unwrap(), None);
        reopened.remove("accessToken").unwrap();
    }

    #[test]
    fn test_file_store_persists_between_instances() {
        let dir = tempfile::tempdir().unwrap();

        let store = FileStore::new(dir.path());
        store.set("accessToken", "abc").unwrap();
        store.set("refreshToken", "r1").unwrap();

        let reopened = FileStore::new(dir.path());
        assert_eq!(reopened.get("accessToken").unwrap().as_deref(), Some("abc"));
        assert_eq!(reopened.get("refreshToken").unwrap().as_deref(), Some("r1"));
    }

    #[test]
    fn test_file_store_deletes_file_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.set("accessToken", "abc").unwrap();
        assert!(store.path().exists());

        store.remove("accessToken").unwrap();
        assert!(!store.path().exists());
        assert_eq!(store.get("accessToken").unwrap(), None);
    }

    #[test]
    fn test_file_store_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("carelink").join("profile");
        let store = FileStore::new(&nested);

        store.set("user", "{}").unwrap();
        assert!(nested.join(CREDENTIALS_FILE).exists());
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CREDENTIALS_FILE), "not json").unwrap();

        let store = FileStore::new(dir.path());
        assert!(matches!(
            store.get("accessToken"),
            Err(StoreError::Serialization(_))
        ));
    }
}
