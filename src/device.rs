//! Device-local flags: the system lock, the armed-session marker and the
//! cached player identity.
//!
//! These live in a small string key-value store that belongs to this device
//! alone. [`DeviceState`] is the single reader and writer of the keys; every
//! other component asks it instead of touching storage directly.

use crate::error::StorageError;
use crate::types::PlayerIdentity;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// `"true"` while the device is locked
pub const SYSTEM_LOCK_KEY: &str = "wren-manor-system-completed";
/// `"active"` once a session has been armed on this device
pub const SESSION_KEY: &str = "wren-manor-game-session";
/// JSON `{playerName, teamId}`
pub const PLAYER_KEY: &str = "wren-manor-player";

const LOCKED_VALUE: &str = "true";
const SESSION_ACTIVE_VALUE: &str = "active";

/// Synchronous string key-value storage local to one device
pub trait LocalStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Volatile storage, for tests and ephemeral kiosks
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }
}

/// Storage persisted as a JSON object in a single file.
///
/// Every mutation rewrites the file through a temporary sibling and a rename,
/// so a crash never leaves a half-written file behind.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open (or lazily create) the storage file at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), keys = entries.len(), "Device storage opened");
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl LocalStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }
}

/// Typed access to the device-local keys
#[derive(Clone)]
pub struct DeviceState {
    storage: Arc<dyn LocalStorage>,
}

impl DeviceState {
    pub fn new(storage: Arc<dyn LocalStorage>) -> Self {
        Self { storage }
    }

    /// Device state backed by fresh in-memory storage
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Whether this device has finished or been disqualified.
    /// Re-read before every mutating operation; it can change underneath.
    pub fn is_locked(&self) -> bool {
        self.storage.get(SYSTEM_LOCK_KEY).as_deref() == Some(LOCKED_VALUE)
    }

    pub fn set_locked(&self) -> Result<(), StorageError> {
        tracing::warn!("System lock set");
        self.storage.set(SYSTEM_LOCK_KEY, LOCKED_VALUE)
    }

    pub fn clear_locked(&self) -> Result<(), StorageError> {
        tracing::info!("System lock cleared");
        self.storage.remove(SYSTEM_LOCK_KEY)
    }

    pub fn is_session_active(&self) -> bool {
        self.storage.get(SESSION_KEY).as_deref() == Some(SESSION_ACTIVE_VALUE)
    }

    pub fn mark_session_active(&self) -> Result<(), StorageError> {
        self.storage.set(SESSION_KEY, SESSION_ACTIVE_VALUE)
    }

    pub fn clear_session(&self) -> Result<(), StorageError> {
        self.storage.remove(SESSION_KEY)
    }

    /// Locally cached identity. Unparsable or incomplete entries count as absent.
    pub fn cached_identity(&self) -> Option<PlayerIdentity> {
        let raw = self.storage.get(PLAYER_KEY)?;
        match serde_json::from_str::<PlayerIdentity>(&raw) {
            Ok(identity) if identity.is_complete() => Some(identity),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("Ignoring malformed cached player identity: {}", e);
                None
            }
        }
    }

    pub fn cache_identity(&self, identity: &PlayerIdentity) -> Result<(), StorageError> {
        let json = serde_json::to_string(identity)?;
        self.storage.set(PLAYER_KEY, &json)
    }

    pub fn clear_identity(&self) -> Result<(), StorageError> {
        self.storage.remove(PLAYER_KEY)
    }

    /// Raw access for components that need the underlying storage
    pub fn storage(&self) -> &Arc<dyn LocalStorage> {
        &self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_flag_lifecycle() {
        let device = DeviceState::in_memory();
        assert!(!device.is_locked());

        device.set_locked().unwrap();
        assert!(device.is_locked());
        assert_eq!(
            device.storage().get(SYSTEM_LOCK_KEY),
            Some("true".to_string())
        );

        device.clear_locked().unwrap();
        assert!(!device.is_locked());
    }

    #[test]
    fn test_lock_flag_requires_exact_value() {
        let device = DeviceState::in_memory();
        device.storage().set(SYSTEM_LOCK_KEY, "yes").unwrap();
        assert!(!device.is_locked());
    }

    #[test]
    fn test_identity_cache() {
        let device = DeviceState::in_memory();
        assert!(device.cached_identity().is_none());

        let id = PlayerIdentity::new("alice", "red");
        device.cache_identity(&id).unwrap();
        assert_eq!(device.cached_identity(), Some(id));

        let raw = device.storage().get(PLAYER_KEY).unwrap();
        assert!(raw.contains("\"playerName\":\"alice\""));

        device.clear_identity().unwrap();
        assert!(device.cached_identity().is_none());
    }

    #[test]
    fn test_malformed_identity_is_absent() {
        let device = DeviceState::in_memory();
        device.storage().set(PLAYER_KEY, "{not json").unwrap();
        assert!(device.cached_identity().is_none());

        device
            .storage()
            .set(PLAYER_KEY, r#"{"playerName":"","teamId":"red"}"#)
            .unwrap();
        assert!(device.cached_identity().is_none());
    }

    #[test]
    fn test_file_storage_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.json");

        {
            let storage = FileStorage::open(&path).unwrap();
            let device = DeviceState::new(Arc::new(storage));
            device.set_locked().unwrap();
            device.mark_session_active().unwrap();
        }

        let reopened = DeviceState::new(Arc::new(FileStorage::open(&path).unwrap()));
        assert!(reopened.is_locked());
        assert!(reopened.is_session_active());

        reopened.clear_locked().unwrap();
        let again = DeviceState::new(Arc::new(FileStorage::open(&path).unwrap()));
        assert!(!again.is_locked());
    }

    #[test]
    fn test_file_storage_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.json");
        std::fs::write(&path, "][").unwrap();
        assert!(matches!(
            FileStorage::open(&path),
            Err(StorageError::Json(_))
        ));
    }
}
