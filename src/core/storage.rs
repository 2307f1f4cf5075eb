//! Key-value persistence used by the geofence store.
//!
//! Values are whole JSON documents keyed by name. The file-backed store keeps
//! one `<key>.json` file per key in the app data directory.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::error::Result;

/// String-keyed storage of whole serialized values.
pub trait KeyValueStore: Send + Sync {
    /// Returns `Ok(None)` when the key has never been written.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value stored under `key`.
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Stores each key as a JSON file inside `data_dir`.
pub struct JsonFileStore {
    data_dir: PathBuf,
}

impl JsonFileStore {
    /// Create a new file store.
    ///
    /// The directory is created lazily on first write.
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.key_path(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;

        // Write to a sibling temp file and rename so readers never see a half-written file
        let path = self.key_path(key);
        let tmp = self.data_dir.join(format!(".{}.json.tmp", key));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// In-process store, used by tests and as a scratch backend.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_store_absent_key() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("data"));
        assert!(store.get("alarms").unwrap().is_none());
    }

    #[test]
    fn test_file_store_set_and_get() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested/data"));

        store.set("alarms", "[1,2,3]").unwrap();
        assert_eq!(store.get("alarms").unwrap().as_deref(), Some("[1,2,3]"));

        store.set("alarms", "[]").unwrap();
        assert_eq!(store.get("alarms").unwrap().as_deref(), Some("[]"));

        // No temp file left behind
        let leftovers: Vec<_> = fs::read_dir(store.data_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert!(store.get("k").unwrap().is_none());
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }
}
