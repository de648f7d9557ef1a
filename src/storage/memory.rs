//! In-memory implementation of the storage contract.
//!
//! Same observable semantics as [`super::SqliteStorage`], including
//! versioning, readonly rules, no-op deletes, and keyset pagination, over
//! process-local maps. Intended for host test suites and ephemeral tooling;
//! nothing survives the process.

use crate::bucket::{
    Bucket, FileDescription, FileFilter, FileId, FileRecord, NewFile, Page,
};
use crate::contract::{BucketStorage, FileStorage};
use crate::error::StorageError;
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Clone)]
struct BucketState {
    readonly: bool,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    buckets: BTreeMap<String, BucketState>,
    // Keyed by file id; BTreeMap gives the same id-ascending iteration
    // order the SQL adapter gets from its index.
    files: BTreeMap<FileId, FileRecord>,
}

/// Map-backed storage contract variant.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: RwLock<State>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FileStorage for MemoryStorage {
    fn create(&self, file: &NewFile) -> Result<FileRecord> {
        if file.name.trim().is_empty() {
            return Err(StorageError::Validation("file name must not be empty".into()));
        }
        if file.bucket.trim().is_empty() {
            return Err(StorageError::Validation("bucket code must not be empty".into()));
        }

        let mut state = self.write();
        let bucket = state
            .buckets
            .get(&file.bucket)
            .ok_or_else(|| StorageError::BucketNotFound(file.bucket.clone()))?;
        if bucket.readonly {
            return Err(StorageError::BucketReadOnly(file.bucket.clone()));
        }

        let now = Utc::now();
        let record = FileRecord {
            id: FileId::generate(),
            bucket: file.bucket.clone(),
            name: file.name.clone(),
            data: file.data.clone(),
            meta: file.meta.clone(),
            version: 0,
            created_at: now,
            modified_at: now,
        };
        if state.files.contains_key(&record.id) {
            return Err(StorageError::DuplicateKey(record.id.to_string()));
        }
        state.files.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn get(&self, id: &FileId) -> Result<Option<FileRecord>> {
        Ok(self.read().files.get(id).cloned())
    }

    fn describe(&self, id: &FileId) -> Result<Option<FileDescription>> {
        Ok(self.read().files.get(id).map(FileRecord::description))
    }

    fn update(&self, record: &FileRecord) -> Result<FileRecord> {
        if record.name.trim().is_empty() {
            return Err(StorageError::Validation("file name must not be empty".into()));
        }

        let mut state = self.write();
        let Some(stored) = state.files.get(&record.id) else {
            return Err(StorageError::NotFound(record.id.to_string()));
        };
        let bucket_code = stored.bucket.clone();
        if bucket_code != record.bucket {
            return Err(StorageError::Validation(format!(
                "file {} belongs to bucket '{bucket_code}', not '{}'",
                record.id, record.bucket
            )));
        }
        let readonly = state
            .buckets
            .get(&bucket_code)
            .is_some_and(|b| b.readonly);
        if readonly {
            return Err(StorageError::BucketReadOnly(bucket_code));
        }

        let stored = state
            .files
            .get_mut(&record.id)
            .ok_or_else(|| StorageError::NotFound(record.id.to_string()))?;
        if stored.version != record.version {
            return Err(StorageError::Conflict {
                id: record.id.to_string(),
                expected: record.version,
                stored: stored.version,
            });
        }

        stored.name = record.name.clone();
        stored.data = record.data.clone();
        stored.meta = record.meta.clone();
        stored.version += 1;
        stored.modified_at = Utc::now();
        Ok(stored.clone())
    }

    fn delete(&self, id: &FileId) -> Result<()> {
        let mut state = self.write();
        let Some(stored) = state.files.get(id) else {
            // No-op, matching the SQL adapter's documented behavior.
            return Ok(());
        };
        let bucket_code = stored.bucket.clone();
        if state
            .buckets
            .get(&bucket_code)
            .is_some_and(|b| b.readonly)
        {
            return Err(StorageError::BucketReadOnly(bucket_code));
        }
        state.files.remove(id);
        Ok(())
    }

    fn exists(&self, id: &FileId) -> Result<bool> {
        Ok(self.read().files.contains_key(id))
    }

    fn list(&self, filter: &FileFilter, page: &Page) -> Result<Vec<FileDescription>> {
        let state = self.read();
        let results = state
            .files
            .values()
            .filter(|f| filter.bucket.as_deref().is_none_or(|b| f.bucket == b))
            .filter(|f| {
                filter
                    .name_prefix
                    .as_deref()
                    .is_none_or(|p| f.name.starts_with(p))
            })
            .filter(|f| page.after.as_ref().is_none_or(|after| f.id > *after))
            .take(page.effective_limit())
            .map(FileRecord::description)
            .collect();
        Ok(results)
    }
}

impl BucketStorage for MemoryStorage {
    fn create_bucket(&self, code: &str) -> Result<()> {
        if code.trim().is_empty() {
            return Err(StorageError::Validation("bucket code must not be empty".into()));
        }
        let mut state = self.write();
        let now = Utc::now();
        state.buckets.entry(code.to_string()).or_insert(BucketState {
            readonly: false,
            created_at: now,
            modified_at: now,
        });
        Ok(())
    }

    fn get_bucket(&self, code: &str) -> Result<Bucket> {
        let state = self.read();
        let bucket = state
            .buckets
            .get(code)
            .ok_or_else(|| StorageError::BucketNotFound(code.to_string()))?;
        let contents = state
            .files
            .values()
            .filter(|f| f.bucket == code)
            .map(FileRecord::description)
            .collect();
        Ok(Bucket {
            code: code.to_string(),
            readonly: bucket.readonly,
            created_at: bucket.created_at,
            modified_at: bucket.modified_at,
            contents,
        })
    }

    fn set_read_only(&self, code: &str, readonly: bool) -> Result<()> {
        let mut state = self.write();
        let bucket = state
            .buckets
            .get_mut(code)
            .ok_or_else(|| StorageError::BucketNotFound(code.to_string()))?;
        if bucket.readonly != readonly {
            bucket.readonly = readonly;
            bucket.modified_at = Utc::now();
        }
        Ok(())
    }

    fn delete_bucket(&self, code: &str) -> Result<()> {
        let mut state = self.write();
        if !state.buckets.contains_key(code) {
            return Ok(());
        }
        if state.files.values().any(|f| f.bucket == code) {
            return Err(StorageError::BucketNotEmpty(code.to_string()));
        }
        state.buckets.remove(code);
        Ok(())
    }
}
