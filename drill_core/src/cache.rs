//! Per-user cache of the working state.
//!
//! Entries are keyed by `(user_id, CacheKey)`. The file-backed store keeps
//! one directory per user so a whole namespace can be purged at once, and
//! writes each entry atomically with file locking.

use crate::changes::Category;
use crate::{Error, Result};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tempfile::NamedTempFile;

/// Directory for device-scoped entries. User directories are always
/// `user-<hex>`, so no user id can land here.
const DEVICE_DIR: &str = "device";

/// What a cache entry holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Category(Category),
    /// Local-to-backend group identifier map
    Identifiers,
    /// Which user the cache currently belongs to (device namespace)
    ActiveUser,
}

impl CacheKey {
    /// Device-scoped keys belong to no user: they ignore the `user_id`
    /// argument and survive `clear_user_cache`.
    pub fn is_device_scoped(self) -> bool {
        matches!(self, CacheKey::ActiveUser)
    }

    pub fn file_stem(self) -> &'static str {
        match self {
            CacheKey::Category(category) => category.as_str(),
            CacheKey::Identifiers => "identifiers",
            CacheKey::ActiveUser => "active_user",
        }
    }
}

impl From<Category> for CacheKey {
    fn from(category: Category) -> Self {
        CacheKey::Category(category)
    }
}

/// Persistent byte store keyed by user and entry.
///
/// Device-scoped keys (see `CacheKey::is_device_scoped`) are shared by all
/// users and are never removed by `clear_user_cache`.
pub trait CacheStore: Send + Sync {
    /// Returns `Ok(None)` when nothing is cached for the key.
    fn get(&self, user_id: &str, key: CacheKey) -> Result<Option<Vec<u8>>>;

    fn set(&self, user_id: &str, key: CacheKey, bytes: &[u8]) -> Result<()>;

    /// Remove every entry in the user's namespace.
    fn clear_user_cache(&self, user_id: &str) -> Result<()>;
}

/// Read and decode a JSON entry.
///
/// Missing, unreadable and malformed entries all come back as `None`; the
/// cache is never a reason to fail.
pub fn load_json<T: DeserializeOwned>(
    store: &dyn CacheStore,
    user_id: &str,
    key: CacheKey,
) -> Option<T> {
    let bytes = match store.get(user_id, key) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!("Unable to read cached {}: {}", key.file_stem(), e);
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            let err = Error::Decode(format!("{}: {}", key.file_stem(), e));
            tracing::warn!("{}. Treating cache entry as absent.", err);
            None
        }
    }
}

/// Encode and write a JSON entry.
pub fn store_json<T: Serialize + ?Sized>(
    store: &dyn CacheStore,
    user_id: &str,
    key: CacheKey,
    value: &T,
) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    store.set(user_id, key, &bytes)
}

/// The user the cache was last activated for.
pub fn load_active_user(store: &dyn CacheStore) -> Option<String> {
    load_json(store, "", CacheKey::ActiveUser)
}

pub fn store_active_user(store: &dyn CacheStore, user_id: &str) -> Result<()> {
    store_json(store, "", CacheKey::ActiveUser, user_id)
}

// ============================================================================
// File-backed store
// ============================================================================

/// Cache rooted at a directory, one subdirectory per user.
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// User ids are hex-encoded so arbitrary ids map to distinct, safe names.
    fn user_dir(&self, user_id: &str) -> PathBuf {
        let encoded: String = user_id.bytes().map(|b| format!("{:02x}", b)).collect();
        self.root.join(format!("user-{}", encoded))
    }

    fn entry_dir(&self, user_id: &str, key: CacheKey) -> PathBuf {
        if key.is_device_scoped() {
            self.root.join(DEVICE_DIR)
        } else {
            self.user_dir(user_id)
        }
    }

    fn entry_path(&self, user_id: &str, key: CacheKey) -> PathBuf {
        self.entry_dir(user_id, key)
            .join(format!("{}.json", key.file_stem()))
    }
}

impl CacheStore for FileCache {
    fn get(&self, user_id: &str, key: CacheKey) -> Result<Option<Vec<u8>>> {
        let path = self.entry_path(user_id, key);
        if !path.exists() {
            return Ok(None);
        }

        let file = File::open(&path)?;
        // Acquire shared lock for reading
        file.lock_shared()?;

        let mut contents = Vec::new();
        let read = std::io::BufReader::new(&file).read_to_end(&mut contents);
        file.unlock()?;
        read?;

        tracing::debug!("Read cache entry {:?}", path);
        Ok(Some(contents))
    }

    fn set(&self, user_id: &str, key: CacheKey, bytes: &[u8]) -> Result<()> {
        let dir = self.entry_dir(user_id, key);
        std::fs::create_dir_all(&dir)?;

        // Temp file in the same directory so the rename is atomic
        let temp = NamedTempFile::new_in(&dir)?;
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            writer.write_all(bytes)?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;

        let path = self.entry_path(user_id, key);
        temp.persist(&path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Wrote cache entry {:?}", path);
        Ok(())
    }

    fn clear_user_cache(&self, user_id: &str) -> Result<()> {
        let dir = self.user_dir(user_id);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
            tracing::info!("Cleared cache namespace {:?}", dir);
        }
        Ok(())
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Process-local cache, mostly useful for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<(String, CacheKey), Vec<u8>>>,
}

fn memory_key(user_id: &str, key: CacheKey) -> (String, CacheKey) {
    if key.is_device_scoped() {
        (String::new(), key)
    } else {
        (user_id.to_string(), key)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries held for a user.
    pub fn entry_count(&self, user_id: &str) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|(user, key)| user == user_id && !key.is_device_scoped())
            .count()
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, user_id: &str, key: CacheKey) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(&memory_key(user_id, key)).cloned())
    }

    fn set(&self, user_id: &str, key: CacheKey, bytes: &[u8]) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(memory_key(user_id, key), bytes.to_vec());
        Ok(())
    }

    fn clear_user_cache(&self, user_id: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|(user, key), _| user != user_id || key.is_device_scoped());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FilterPreferences;

    const PREFS: CacheKey = CacheKey::Category(Category::Preferences);

    #[test]
    fn test_file_cache_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(temp_dir.path());

        let mut prefs = FilterPreferences::default();
        prefs.time_budget = Some(30);
        store_json(&cache, "alice", PREFS, &prefs).unwrap();

        let loaded: FilterPreferences = load_json(&cache, "alice", PREFS).unwrap();
        assert_eq!(loaded, prefs);
    }

    #[test]
    fn test_missing_entry_is_none() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(temp_dir.path());

        assert!(cache.get("alice", PREFS).unwrap().is_none());
        assert!(load_json::<FilterPreferences>(&cache, "alice", PREFS).is_none());
    }

    #[test]
    fn test_corrupted_entry_decodes_to_none() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(temp_dir.path());
        cache.set("alice", PREFS, b"{ invalid json }").unwrap();

        assert!(load_json::<FilterPreferences>(&cache, "alice", PREFS).is_none());
    }

    #[test]
    fn test_users_are_isolated() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(temp_dir.path());
        cache.set("alice", PREFS, b"{}").unwrap();
        cache.set("bob", PREFS, b"{}").unwrap();

        cache.clear_user_cache("alice").unwrap();

        assert!(cache.get("alice", PREFS).unwrap().is_none());
        assert!(cache.get("bob", PREFS).unwrap().is_some());
    }

    #[test]
    fn test_similar_user_ids_do_not_collide() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(temp_dir.path());
        cache.set("a.b", PREFS, b"1").unwrap();
        cache.set("a_b", PREFS, b"2").unwrap();

        assert_eq!(cache.get("a.b", PREFS).unwrap(), Some(b"1".to_vec()));
        assert_eq!(cache.get("a_b", PREFS).unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(temp_dir.path());
        cache.set("alice", PREFS, b"{}").unwrap();
        cache.set("alice", PREFS, b"{}").unwrap();

        let user_dir = cache.user_dir("alice");
        let names: Vec<_> = std::fs::read_dir(&user_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("preferences.json")]);
    }

    #[test]
    fn test_user_cannot_reach_device_entries() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = FileCache::new(temp_dir.path());
        let memory = MemoryCache::new();
        let caches: [&dyn CacheStore; 2] = [&file, &memory];
        for cache in caches {
            store_active_user(cache, "alice").unwrap();
            cache.set("device", PREFS, b"{}").unwrap();
            cache.set("_device", PREFS, b"{}").unwrap();

            cache.clear_user_cache("device").unwrap();
            cache.clear_user_cache("_device").unwrap();
            cache.clear_user_cache("").unwrap();

            assert_eq!(load_active_user(cache).as_deref(), Some("alice"));
            assert!(cache.get("device", PREFS).unwrap().is_none());
        }
    }

    #[test]
    fn test_memory_cache_clear() {
        let cache = MemoryCache::new();
        cache.set("alice", PREFS, b"{}").unwrap();
        cache.set("alice", CacheKey::Identifiers, b"{}").unwrap();
        cache.set("bob", PREFS, b"{}").unwrap();
        assert_eq!(cache.entry_count("alice"), 2);

        cache.clear_user_cache("alice").unwrap();
        assert_eq!(cache.entry_count("alice"), 0);
        assert_eq!(cache.entry_count("bob"), 1);
    }
}
