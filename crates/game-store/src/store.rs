//! Key/value blob storage.
//!
//! Values are JSON strings. `MemoryStore` can enforce a byte quota the way a
//! browser's local storage does; `FileStore` keeps one file per key.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::error::StoreError;

pub trait KeyValueStore: Send + Sync {
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Returns whether the key existed.
    fn remove(&self, key: &str) -> Result<bool, StoreError>;

    /// Every entry whose key starts with `prefix`, ordered by key.
    fn list_all(&self, prefix: &str) -> Result<Vec<(String, String)>, StoreError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for &T {
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).put(key, value)
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        (**self).remove(key)
    }

    fn list_all(&self, prefix: &str) -> Result<Vec<(String, String)>, StoreError> {
        (**self).list_all(prefix)
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).put(key, value)
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        (**self).remove(key)
    }

    fn list_all(&self, prefix: &str) -> Result<Vec<(String, String)>, StoreError> {
        (**self).list_all(prefix)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
    /// Bytes of keys plus values.
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: RwLock::default(),
            quota: Some(quota),
        }
    }

    pub fn used_bytes(&self) -> usize {
        self.entries
            .read()
            .map(|e| e.iter().map(|(k, v)| k.len() + v.len()).sum())
            .unwrap_or(0)
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("store lock poisoned".to_string())
}

impl KeyValueStore for MemoryStore {
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(poisoned)?;

        if let Some(quota) = self.quota {
            let current: usize = entries.iter().map(|(k, v)| k.len() + v.len()).sum();
            let replaced = entries.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
            let needed = current - replaced + key.len() + value.len();
            if needed > quota {
                return Err(StoreError::Capacity { needed, quota });
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        Ok(entries.remove(key).is_some())
    }

    fn list_all(&self, prefix: &str) -> Result<Vec<(String, String)>, StoreError> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// One `<key>.json` file per entry in a directory. Characters outside
/// `[A-Za-z0-9_-]` are percent-encoded in file names.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "file store opened");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_key(key)))
    }
}

fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || b == b'_' || b == b'-' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

fn decode_key(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

impl KeyValueStore for FileStore {
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list_all(&self, prefix: &str) -> Result<Vec<(String, String)>, StoreError> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(stem) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(".json"))
            else {
                continue;
            };
            let Some(key) = decode_key(stem) else {
                continue;
            };
            if key.starts_with(prefix) {
                out.push((key, fs::read_to_string(&path)?));
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("game-store-{name}-{}-{nanos}", std::process::id()))
    }

    fn exercise(store: &dyn KeyValueStore) {
        store.put("saves/b", "2").unwrap();
        store.put("saves/a", "1").unwrap();
        store.put("settings", "{}").unwrap();

        assert_eq!(store.get("saves/a").unwrap().as_deref(), Some("1"));
        assert_eq!(store.get("missing").unwrap(), None);

        let listed = store.list_all("saves/").unwrap();
        assert_eq!(
            listed,
            vec![
                ("saves/a".to_string(), "1".to_string()),
                ("saves/b".to_string(), "2".to_string())
            ]
        );

        store.put("saves/a", "one").unwrap();
        assert_eq!(store.get("saves/a").unwrap().as_deref(), Some("one"));

        assert!(store.remove("saves/a").unwrap());
        assert!(!store.remove("saves/a").unwrap());
        assert_eq!(store.list_all("saves/").unwrap().len(), 1);
    }

    #[test]
    fn test_memory_store_contract() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn test_file_store_contract() {
        let dir = temp_dir("contract");
        let store = FileStore::open(&dir).unwrap();
        exercise(&store);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_memory_quota() {
        let store = MemoryStore::with_quota(20);
        store.put("key", "0123456789").unwrap();
        assert_eq!(store.used_bytes(), 13);

        let err = store.put("other", "0123456789").unwrap_err();
        assert!(matches!(err, StoreError::Capacity { needed: 28, quota: 20 }));
        assert_eq!(store.get("other").unwrap(), None);

        // Replacing a value only counts the difference.
        store.put("key", "01234567890123456").unwrap();
    }

    #[test]
    fn test_key_encoding() {
        assert_eq!(encode_key("chess-game-saves/game_1"), "chess-game-saves%2Fgame_1");
        assert_eq!(
            decode_key("chess-game-saves%2Fgame_1").as_deref(),
            Some("chess-game-saves/game_1")
        );
        assert_eq!(decode_key("bad%2"), None);
    }
}
