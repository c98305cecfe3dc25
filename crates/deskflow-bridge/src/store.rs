use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tempfile::NamedTempFile;

use crate::error::{BridgeError, Result};

/// Key-value store shared by all scripts. Writes are serialized and each
/// one rewrites the backing file.
pub struct ScriptStore {
    path: Option<PathBuf>,
    values: Mutex<Map<String, Value>>,
}

impl ScriptStore {
    /// Store that is never persisted.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: Mutex::new(Map::new()),
        }
    }

    /// Loads `path`. A missing or unreadable file starts an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                log::warn!("ignoring unreadable store {}: {e}", path.display());
                Map::new()
            }),
            Err(_) => Map::new(),
        };
        Self {
            path: Some(path),
            values: Mutex::new(values),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }

    /// Sets `key` and persists while still holding the lock, so concurrent
    /// writers cannot interleave file contents. The value only becomes
    /// visible once it is on disk.
    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self.values.lock();
        let Some(path) = &self.path else {
            values.insert(key.to_string(), value);
            return Ok(());
        };
        let mut next = values.clone();
        next.insert(key.to_string(), value);
        persist(path, &next)?;
        *values = next;
        Ok(())
    }
}

fn persist(path: &Path, values: &Map<String, Value>) -> Result<()> {
    let store_error = |e: std::io::Error| BridgeError::Store(format!("{}: {e}", path.display()));
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(store_error)?;

    let text = serde_json::to_string_pretty(values)?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(store_error)?;
    tmp.write_all(text.as_bytes()).map_err(store_error)?;
    tmp.persist(path).map_err(|e| store_error(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let store = ScriptStore::open(&path);
        assert!(store.is_empty());
        store.set("count", json!(3)).unwrap();
        store.set("names", json!(["a", "b"])).unwrap();

        let reopened = ScriptStore::open(&path);
        assert_eq!(reopened.get("count"), Some(json!(3)));
        assert_eq!(reopened.get("names"), Some(json!(["a", "b"])));
        assert_eq!(reopened.get("missing"), None);
    }

    #[test]
    fn test_garbled_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "{not json").unwrap();

        let store = ScriptStore::open(&path);
        assert!(store.is_empty());
        store.set("k", json!("v")).unwrap();
        assert_eq!(ScriptStore::open(&path).get("k"), Some(json!("v")));
    }

    #[test]
    fn test_concurrent_writers_all_land() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = Arc::new(ScriptStore::open(&path));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.set(&format!("key{i}"), json!(i)).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ScriptStore::open(&path).len(), 8);
    }

    #[test]
    fn test_failed_write_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = ScriptStore::open(&path);
        store.set("kept", json!(1)).unwrap();

        // A directory where the file should go makes every write fail.
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();

        assert!(matches!(
            store.set("lost", json!(2)),
            Err(BridgeError::Store(_))
        ));
        assert_eq!(store.get("lost"), None);
        assert_eq!(store.get("kept"), Some(json!(1)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_in_memory_store_has_no_path() {
        let store = ScriptStore::in_memory();
        store.set("k", json!(true)).unwrap();
        assert_eq!(store.get("k"), Some(json!(true)));
        assert!(store.path().is_none());
    }
}
