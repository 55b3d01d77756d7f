// Cache store for tracked-repository records.
// Persists one record per (user, repository) with atomic replace semantics.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::trace;

use crate::error::{Result, RunwatchError};

use super::paths;
use super::record::{CacheKey, CacheRecord};

/// Persistence for cache records, keyed by (owner identity, repository).
///
/// `upsert` replaces the whole record atomically; readers never observe a
/// partially written record.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheRecord>>;

    fn upsert(&self, record: &CacheRecord) -> Result<()>;

    /// Replace the record only if one is still stored for its key.
    /// Returns `false`, writing nothing, when the key has been removed.
    fn update(&self, record: &CacheRecord) -> Result<bool>;

    /// Store the record unless one already exists for its key.
    /// Returns `false` when a record was already present.
    fn insert_if_absent(&self, record: &CacheRecord) -> Result<bool>;

    /// Delete the record for a key. Returns whether one existed.
    fn remove(&self, key: &CacheKey) -> Result<bool>;

    /// All records tracked by one user, in no particular order.
    fn list(&self, owner_identity: &str) -> Result<Vec<CacheRecord>>;
}

/// Record store backed by one JSON file per key.
pub struct FileCacheStore {
    base: PathBuf,
    write_lock: Mutex<()>,
}

impl FileCacheStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store under the platform cache directory.
    pub fn open_default() -> Result<Self> {
        paths::cache_dir()
            .map(Self::new)
            .ok_or_else(|| RunwatchError::Storage("no cache directory available".to_string()))
    }

    fn path(&self, key: &CacheKey) -> PathBuf {
        paths::record_path(&self.base, &key.owner_identity, &key.repo)
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| RunwatchError::Storage("cache write lock poisoned".to_string()))
    }
}

impl CacheStore for FileCacheStore {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheRecord>> {
        read_record(&self.path(key))
    }

    fn upsert(&self, record: &CacheRecord) -> Result<()> {
        let _guard = self.lock()?;
        write_record(&self.path(&record.key()), record)
    }

    fn update(&self, record: &CacheRecord) -> Result<bool> {
        let _guard = self.lock()?;
        let path = self.path(&record.key());
        if !path.exists() {
            return Ok(false);
        }
        write_record(&path, record)?;
        Ok(true)
    }

    fn insert_if_absent(&self, record: &CacheRecord) -> Result<bool> {
        let _guard = self.lock()?;
        let path = self.path(&record.key());
        if path.exists() {
            return Ok(false);
        }
        write_record(&path, record)?;
        Ok(true)
    }

    fn remove(&self, key: &CacheKey) -> Result<bool> {
        let _guard = self.lock()?;
        let path = self.path(key);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;

        // Drop the owner directory once its last repository is gone
        if let Some(parent) = path.parent() {
            if fs::read_dir(parent)?.next().is_none() {
                fs::remove_dir(parent)?;
            }
        }
        Ok(true)
    }

    fn list(&self, owner_identity: &str) -> Result<Vec<CacheRecord>> {
        let repos_dir = paths::repos_dir(&self.base, owner_identity);
        if !repos_dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for owner_entry in fs::read_dir(&repos_dir)? {
            let owner_entry = owner_entry?;
            if !owner_entry.file_type()?.is_dir() {
                continue;
            }
            for entry in fs::read_dir(owner_entry.path())? {
                let path = entry?.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    if let Some(record) = read_record(&path)? {
                        records.push(record);
                    }
                }
            }
        }
        Ok(records)
    }
}

/// Read a record file, returning None if it does not exist.
fn read_record(path: &Path) -> Result<Option<CacheRecord>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path)?;
    let record: CacheRecord = serde_json::from_str(&contents)?;
    record.validate()?;
    Ok(Some(record))
}

/// Temp file next to `path`, unique to this process.
fn temp_path(path: &Path) -> PathBuf {
    path.with_extension(format!("{}.tmp", std::process::id()))
}

/// Write a record file atomically via a temp file.
fn write_record(path: &Path, record: &CacheRecord) -> Result<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(record)?;

    let temp_path = temp_path(path);
    let mut file = fs::File::create(&temp_path)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;
    fs::rename(&temp_path, path)?;

    trace!(path = %path.display(), "wrote cache record");
    Ok(())
}

/// Record store held in memory.
#[derive(Default)]
pub struct MemoryCacheStore {
    records: Mutex<HashMap<CacheKey, CacheRecord>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> Result<MutexGuard<'_, HashMap<CacheKey, CacheRecord>>> {
        self.records
            .lock()
            .map_err(|_| RunwatchError::Storage("memory store lock poisoned".to_string()))
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheRecord>> {
        Ok(self.records()?.get(key).cloned())
    }

    fn upsert(&self, record: &CacheRecord) -> Result<()> {
        self.records()?.insert(record.key(), record.clone());
        Ok(())
    }

    fn update(&self, record: &CacheRecord) -> Result<bool> {
        let mut records = self.records()?;
        match records.get_mut(&record.key()) {
            Some(stored) => {
                *stored = record.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn insert_if_absent(&self, record: &CacheRecord) -> Result<bool> {
        let mut records = self.records()?;
        let key = record.key();
        if records.contains_key(&key) {
            return Ok(false);
        }
        records.insert(key, record.clone());
        Ok(true)
    }

    fn remove(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.records()?.remove(key).is_some())
    }

    fn list(&self, owner_identity: &str) -> Result<Vec<CacheRecord>> {
        Ok(self
            .records()?
            .values()
            .filter(|record| record.owner_identity() == owner_identity)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    use crate::github::{RepoCoordinates, RunStatus, WorkflowRun};

    fn record(owner_identity: &str, repo: &str) -> CacheRecord {
        let repo: RepoCoordinates = repo.parse().unwrap();
        CacheRecord::new(CacheKey::new(owner_identity, repo), Utc::now())
    }

    fn sample_runs() -> Vec<WorkflowRun> {
        vec![WorkflowRun {
            id: 7,
            name: None,
            status: RunStatus::InProgress,
            conclusion: None,
            head_branch: Some("feature/x".to_string()),
            created_at: Utc::now(),
            html_url: "https://github.com/o/r/actions/runs/7".to_string(),
        }]
    }

    fn exercise_store(store: &dyn CacheStore) {
        let mut rec = record("1", "phatblat/jolt");
        let key = rec.key();

        assert!(store.get(&key).unwrap().is_none());
        assert!(store.insert_if_absent(&rec).unwrap());
        assert!(!store.insert_if_absent(&rec).unwrap());
        assert_eq!(store.get(&key).unwrap(), Some(rec.clone()));

        rec.apply_fresh(&sample_runs(), Some("\"v1\"".to_string()), Utc::now())
            .unwrap();
        store.upsert(&rec).unwrap();
        let stored = store.get(&key).unwrap().unwrap();
        assert_eq!(stored, rec);
        assert_eq!(stored.runs().unwrap(), Some(sample_runs()));

        rec.mark_not_modified(Utc::now());
        assert!(store.update(&rec).unwrap());
        assert_eq!(store.get(&key).unwrap(), Some(rec.clone()));

        // Upsert replaces rather than appends
        store.upsert(&rec).unwrap();
        store.insert_if_absent(&record("1", "rust-lang/rust")).unwrap();
        store.insert_if_absent(&record("2", "phatblat/jolt")).unwrap();
        assert_eq!(store.list("1").unwrap().len(), 2);
        assert_eq!(store.list("2").unwrap().len(), 1);
        assert!(store.list("3").unwrap().is_empty());

        assert!(store.remove(&key).unwrap());
        assert!(!store.remove(&key).unwrap());
        assert!(store.get(&key).unwrap().is_none());
        assert_eq!(store.list("1").unwrap().len(), 1);

        // A removed record is not brought back by a late write-back
        assert!(!store.update(&rec).unwrap());
        assert!(store.get(&key).unwrap().is_none());
    }

    #[test]
    fn test_memory_store() {
        exercise_store(&MemoryCacheStore::new());
    }

    #[test]
    fn test_file_store() {
        let temp_dir = TempDir::new().unwrap();
        exercise_store(&FileCacheStore::new(temp_dir.path()));
    }

    #[test]
    fn test_file_store_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileCacheStore::new(temp_dir.path());
        let rec = record("1", "o/r");
        store.upsert(&rec).unwrap();

        let path = paths::record_path(temp_dir.path(), "1", rec.repo());
        assert!(path.exists());
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_write_does_not_touch_other_writers_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileCacheStore::new(temp_dir.path());
        let rec = record("1", "o/r");

        // Temp file of a concurrent writer in another process
        let path = paths::record_path(temp_dir.path(), "1", rec.repo());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let foreign = path.with_extension("999999999.tmp");
        fs::write(&foreign, "partial").unwrap();

        store.upsert(&rec).unwrap();

        assert_eq!(fs::read_to_string(&foreign).unwrap(), "partial");
        assert_eq!(store.get(&rec.key()).unwrap(), Some(rec.clone()));
        assert_eq!(store.list("1").unwrap(), vec![rec]);
    }

    #[test]
    fn test_corrupt_record_is_storage_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileCacheStore::new(temp_dir.path());
        let rec = record("1", "o/r");

        let path = paths::record_path(temp_dir.path(), "1", rec.repo());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "not json").unwrap();

        let err = store.get(&rec.key()).unwrap_err();
        assert!(err.is_storage());
    }
}
