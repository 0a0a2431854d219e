use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use keyring::credential::CredentialPersistence;
use keyring::Entry;
use tracing::warn;

/// Key-value backup the session is mirrored to.
///
/// Reads happen once, at startup. Writes are best effort: the in-memory
/// session stays authoritative when they fail.
pub trait DurableStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Process-local storage; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DurableStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// One file per key in a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create session directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl DurableStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.key_path(key)).ok()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        std::fs::write(self.key_path(key), value)
            .with_context(|| format!("Failed to write session key {}", key))
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.key_path(key);
        if path.exists() {
            std::fs::remove_file(path)
                .with_context(|| format!("Failed to remove session key {}", key))?;
        }
        Ok(())
    }
}

/// Session keys stored as OS keychain entries under one service name.
#[derive(Debug, Clone)]
pub struct KeyringStorage {
    service: String,
}

impl KeyringStorage {
    pub fn new(service: impl Into<String>) -> Self {
        if !Self::survives_restart() {
            let persistence = match Self::persistence() {
                CredentialPersistence::EntryOnly => "EntryOnly",
                CredentialPersistence::ProcessOnly => "ProcessOnly",
                CredentialPersistence::UntilReboot => "UntilReboot",
                CredentialPersistence::UntilDelete => "UntilDelete",
                _ => "Unknown",
            };
            warn!(persistence, "Keychain entries will not outlive this process");
        }
        Self {
            service: service.into(),
        }
    }

    /// Lifetime of entries in the keychain backend compiled into this build.
    pub fn persistence() -> CredentialPersistence {
        keyring::default::default_credential_builder().persistence()
    }

    pub fn survives_restart() -> bool {
        matches!(
            Self::persistence(),
            CredentialPersistence::UntilReboot | CredentialPersistence::UntilDelete
        )
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service, key).context("Failed to create keyring entry")
    }
}

impl DurableStorage for KeyringStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entry(key).ok()?.get_password().ok()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .context("Failed to store session key in keychain")
    }

    fn remove(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete session key from keychain"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("bookgate-{}-{}", name, std::process::id()))
    }

    #[test]
    fn test_memory_storage() {
        let storage = MemoryStorage::new();
        assert!(storage.get("token").is_none());
        storage.set("token", "abc").unwrap();
        assert_eq!(storage.get("token").as_deref(), Some("abc"));
        storage.remove("token").unwrap();
        assert!(storage.get("token").is_none());
        storage.remove("token").unwrap();
    }

    #[test]
    fn test_file_storage() {
        let dir = scratch_dir("file-storage");
        let storage = FileStorage::new(dir.clone()).unwrap();
        storage.set("token", "abc").unwrap();
        assert_eq!(storage.get("token").as_deref(), Some("abc"));

        // A second instance over the same directory sees the write.
        let reopened = FileStorage::new(dir.clone()).unwrap();
        assert_eq!(reopened.get("token").as_deref(), Some("abc"));

        storage.remove("token").unwrap();
        assert!(reopened.get("token").is_none());
        storage.remove("token").unwrap();

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_keyring_backend_is_a_real_keychain() {
        // The in-memory mock keeps nothing once the entry is dropped.
        assert!(!matches!(
            KeyringStorage::persistence(),
            CredentialPersistence::EntryOnly
        ));
        assert!(KeyringStorage::survives_restart());
    }
}
