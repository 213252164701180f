//! Local key/value persistence.
//!
//! One string value per key, JSON files in a platform-appropriate data
//! directory. Absence of a key is not an error; callers that need "missing vs
//! malformed" semantics get both through `Option`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::{AppError, AppResult};

/// Storage seam shared by the notification store and cache rules.
///
/// Implementations must be safe to call from concurrent tasks; every
/// operation is a single atomic read or write of one key.
pub trait KeyValueStorage: Send + Sync {
    /// Read the raw value for a key, `None` if the key is absent.
    fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Write the raw value for a key, replacing any prior value.
    fn set(&self, key: &str, value: &str) -> AppResult<()>;

    /// Remove a key entirely. Removing an absent key is a no-op.
    fn remove(&self, key: &str) -> AppResult<()>;
}

/// Load and deserialize a JSON value from storage.
///
/// Returns `None` if the key is absent or the stored payload does not parse;
/// corrupt storage is treated as empty, never fatal.
pub fn load_json<T: DeserializeOwned>(storage: &dyn KeyValueStorage, key: &str) -> Option<T> {
    let raw = storage.get(key).ok()??;
    serde_json::from_str(&raw).ok()
}

/// Serialize and store a JSON value.
pub fn save_json<T: Serialize>(
    storage: &dyn KeyValueStorage,
    key: &str,
    value: &T,
) -> AppResult<()> {
    let raw = serde_json::to_string(value)?;
    storage.set(key, &raw)
}

/// File-backed storage: one JSON file per key under a data directory.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Create a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> AppResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| AppError::Io {
            path: dir.clone(),
            operation: "create storage directory".to_string(),
            source: Some(Box::new(e)),
        })?;
        Ok(Self { dir })
    }

    /// Create a store under the user's home directory (`~/.hublink/storage`).
    pub fn default_location() -> AppResult<Self> {
        let base = directories::BaseDirs::new()
            .ok_or_else(|| AppError::config("Could not determine home directory"))?;
        Self::new(base.home_dir().join(".hublink").join("storage"))
    }

    fn file_path(&self, key: &str) -> PathBuf {
        // Sanitize key to be a valid filename
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        self.dir.join(format!("{}.json", safe_key))
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        let path = self.file_path(key);
        match std::fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::storage_with_source(key, "read", e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let path = self.file_path(key);
        std::fs::write(&path, value).map_err(|e| AppError::storage_with_source(key, "write", e))
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        let path = self.file_path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::storage_with_source(key, "remove", e)),
        }
    }
}

/// In-memory storage, primarily for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_roundtrip() {
        let storage = MemoryStorage::new();
        storage.set("k", "v").unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("v"));

        storage.remove("k").unwrap();
        assert_eq!(storage.get("k").unwrap(), None);
        // Removing an absent key is fine
        storage.remove("k").unwrap();
    }

    #[test]
    fn test_file_storage_sanitizes_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();

        storage.set("cache/buddies:list", "[1,2]").unwrap();
        assert_eq!(
            storage.get("cache/buddies:list").unwrap().as_deref(),
            Some("[1,2]")
        );
        assert!(dir.path().join("cache_buddies_list.json").exists());
    }

    #[test]
    fn test_json_helpers_swallow_corrupt_data() {
        let storage = MemoryStorage::new();
        storage.set("bad", "{not json").unwrap();
        let loaded: Option<Vec<u32>> = load_json(&storage, "bad");
        assert!(loaded.is_none());

        save_json(&storage, "good", &vec![1, 2, 3]).unwrap();
        let loaded: Option<Vec<u32>> = load_json(&storage, "good");
        assert_eq!(loaded, Some(vec![1, 2, 3]));
    }
}
