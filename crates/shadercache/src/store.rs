use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::UNIX_EPOCH;

use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;

/// Directory (or key prefix) that persistent entries live under.
pub const CACHE_DIR: &str = "shader_cache";

/// File suffix for persisted entries.
pub const ENTRY_EXTENSION: &str = "cache";

/// Persistent key/value tier. One entry per cache key; timestamps are
/// milliseconds since the Unix epoch.
pub trait ByteStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;
    fn delete(&self, key: &str) -> Result<(), StoreError>;
    fn list_keys(&self) -> Result<Vec<String>, StoreError>;
    fn last_modified(&self, key: &str) -> Result<Option<u64>, StoreError>;
    fn size_of(&self, key: &str) -> Result<Option<u64>, StoreError>;
}

/// Filesystem store writing `<root>/<key>.cache`.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Opens (creating when needed) the entry directory at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            path: root.clone(),
            source,
        })?;
        debug!(path = %root.display(), "opened shader cache directory");
        Ok(Self { root })
    }

    /// Opens the conventional `shader_cache` directory under `base`.
    pub fn in_dir(base: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open(base.as_ref().join(CACHE_DIR))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.root.join(format!("{key}.{ENTRY_EXTENSION}")))
    }

    /// Path for an entry that may already exist on disk. Stems returned by
    /// `list_keys` can hold characters `put` refuses, but must still be
    /// removable and measurable.
    fn existing_entry_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_file_stem(key)?;
        Ok(self.root.join(format!("{key}.{ENTRY_EXTENSION}")))
    }
}

impl ByteStore for FsStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.entry_path(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.entry_path(key)?;
        fs::write(&path, bytes).map_err(|source| StoreError::Io { path, source })
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.existing_entry_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        let entries = fs::read_dir(&self.root).map_err(|source| StoreError::Io {
            path: self.root.clone(),
            source,
        })?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Io {
                path: self.root.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn last_modified(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let path = self.existing_entry_path(key)?;
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        let modified = metadata
            .modified()
            .map_err(|source| StoreError::Io { path, source })?;
        Ok(Some(
            modified
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_millis() as u64)
                .unwrap_or(0),
        ))
    }

    fn size_of(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let path = self.existing_entry_path(key)?;
        match fs::metadata(&path) {
            Ok(metadata) => Ok(Some(metadata.len())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}

/// Keys become file names, so anything that could escape the directory is refused.
fn validate_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

/// Looser check for names already present in the directory: a single file
/// stem, never a path.
fn validate_file_stem(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && key != "."
        && key != ".."
        && !key.contains('\0')
        && !key.chars().any(std::path::is_separator);
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    bytes: Vec<u8>,
    modified: u64,
}

/// In-process store. Entries are stamped by the supplied clock, which lets
/// tests age them without touching the filesystem.
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, MemoryEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            clock,
        }
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<String, MemoryEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entries", &self.entries().len())
            .finish()
    }
}

impl ByteStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries().get(key).map(|entry| entry.bytes.clone()))
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        validate_key(key)?;
        let modified = self.clock.now_millis();
        self.entries().insert(
            key.to_string(),
            MemoryEntry {
                bytes: bytes.to_vec(),
                modified,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries().remove(key);
        Ok(())
    }

    fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries().keys().cloned().collect())
    }

    fn last_modified(&self, key: &str) -> Result<Option<u64>, StoreError> {
        Ok(self.entries().get(key).map(|entry| entry.modified))
    }

    fn size_of(&self, key: &str) -> Result<Option<u64>, StoreError> {
        Ok(self.entries().get(key).map(|entry| entry.bytes.len() as u64))
    }
}

impl<S: ByteStore + ?Sized> ByteStore for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key)
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        (**self).put(key, bytes)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key)
    }

    fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        (**self).list_keys()
    }

    fn last_modified(&self, key: &str) -> Result<Option<u64>, StoreError> {
        (**self).last_modified(key)
    }

    fn size_of(&self, key: &str) -> Result<Option<u64>, StoreError> {
        (**self).size_of(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn fs_store_round_trips_entries() {
        let temp = tempfile::tempdir().unwrap();
        let store = FsStore::in_dir(temp.path()).expect("open store");
        assert_eq!(store.root(), temp.path().join(CACHE_DIR));

        store.put("1_abc", b"compiled").unwrap();
        assert_eq!(store.get("1_abc").unwrap().as_deref(), Some(&b"compiled"[..]));
        assert!(store.root().join("1_abc.cache").exists());
        assert_eq!(store.size_of("1_abc").unwrap(), Some(8));
        assert!(store.last_modified("1_abc").unwrap().is_some());

        store.delete("1_abc").unwrap();
        assert_eq!(store.get("1_abc").unwrap(), None);
        store.delete("1_abc").expect("deleting a missing entry is not an error");
    }

    #[test]
    fn fs_store_lists_only_cache_entries() {
        let temp = tempfile::tempdir().unwrap();
        let store = FsStore::open(temp.path()).unwrap();
        store.put("1_b", b"x").unwrap();
        store.put("0_a", b"y").unwrap();
        fs::write(temp.path().join("notes.txt"), "ignored").unwrap();

        assert_eq!(store.list_keys().unwrap(), vec!["0_a".to_string(), "1_b".to_string()]);
    }

    #[test]
    fn rejects_path_like_keys() {
        let temp = tempfile::tempdir().unwrap();
        let store = FsStore::open(temp.path()).unwrap();
        assert!(matches!(store.put("../escape", b"x"), Err(StoreError::InvalidKey(_))));
        assert!(matches!(store.get(""), Err(StoreError::InvalidKey(_))));
    }

    #[test]
    fn listed_entries_with_odd_stems_can_be_removed() {
        let temp = tempfile::tempdir().unwrap();
        let store = FsStore::open(temp.path()).unwrap();
        fs::write(temp.path().join("1_abc.old.cache"), "left over").unwrap();

        assert_eq!(store.list_keys().unwrap(), vec!["1_abc.old".to_string()]);
        assert_eq!(store.size_of("1_abc.old").unwrap(), Some(9));
        assert!(store.last_modified("1_abc.old").unwrap().is_some());
        assert!(matches!(store.put("1_abc.old", b"x"), Err(StoreError::InvalidKey(_))));

        store.delete("1_abc.old").unwrap();
        assert!(!temp.path().join("1_abc.old.cache").exists());
        assert!(matches!(store.delete("../escape"), Err(StoreError::InvalidKey(_))));
        assert!(matches!(store.delete(".."), Err(StoreError::InvalidKey(_))));
    }

    #[test]
    fn memory_store_stamps_with_clock() {
        let clock = Arc::new(ManualClock::new(42));
        let store = MemoryStore::with_clock(clock.clone());
        store.put("0_key", b"abc").unwrap();
        clock.advance(std::time::Duration::from_millis(8));
        store.put("1_key", b"de").unwrap();

        assert_eq!(store.last_modified("0_key").unwrap(), Some(42));
        assert_eq!(store.last_modified("1_key").unwrap(), Some(50));
        assert_eq!(store.size_of("1_key").unwrap(), Some(2));
        assert_eq!(store.list_keys().unwrap().len(), 2);
    }
}
