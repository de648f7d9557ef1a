//! Domain types of the storage contract.
//!
//! A [`Bucket`] is a named collection of files. A [`FileRecord`] is one stored
//! file: identifier, name, payload bytes, key/value metadata, and the
//! optimistic-concurrency version that guards updates. [`FileDescription`] is
//! the payload-free form used for listings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Key/value metadata attached to a stored file.
///
/// A `BTreeMap` keeps the JSON encoding deterministic, so identical metadata
/// always persists to an identical column value.
pub type Metadata = BTreeMap<String, String>;

/// Unique identifier of a stored file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(String);

impl FileId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        FileId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FileId {
    fn from(s: &str) -> Self {
        FileId(s.to_string())
    }
}

impl From<String> for FileId {
    fn from(s: String) -> Self {
        FileId(s)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A bucket: the logical collection files live in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bucket {
    /// Unique bucket code.
    pub code: String,
    /// When true, all writes into the bucket are rejected.
    pub readonly: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    /// Descriptions of the files currently stored in the bucket.
    pub contents: Vec<FileDescription>,
}

/// Payload-free description of a stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescription {
    pub id: FileId,
    /// Code of the owning bucket.
    pub bucket: String,
    /// Display name of the file; not unique.
    pub name: String,
    pub meta: Metadata,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// A stored file: description plus decoded payload and the version used for
/// optimistic locking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    pub bucket: String,
    pub name: String,
    /// Decoded payload bytes. The persisted form may be codec-encoded; the
    /// mapping layer applies the codec symmetrically on read and write.
    pub data: Vec<u8>,
    pub meta: Metadata,
    /// Version observed at last read. `update` succeeds only while the
    /// stored version still matches; each successful update increments it.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl FileRecord {
    /// The payload-free view of this record.
    pub fn description(&self) -> FileDescription {
        FileDescription {
            id: self.id.clone(),
            bucket: self.bucket.clone(),
            name: self.name.clone(),
            meta: self.meta.clone(),
            created_at: self.created_at,
            modified_at: self.modified_at,
        }
    }
}

/// Request to store a new file.
#[derive(Debug, Clone, Default)]
pub struct NewFile {
    /// Code of the target bucket; must already exist.
    pub bucket: String,
    pub name: String,
    pub data: Vec<u8>,
    pub meta: Metadata,
}

impl NewFile {
    pub fn new(bucket: impl Into<String>, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            bucket: bucket.into(),
            name: name.into(),
            data: data.into(),
            meta: Metadata::new(),
        }
    }

    /// Attach a metadata entry.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }
}

/// Filter for [`crate::contract::FileStorage::list`].
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    /// Restrict to a single bucket.
    pub bucket: Option<String>,
    /// Restrict to names starting with this prefix.
    pub name_prefix: Option<String>,
}

impl FileFilter {
    pub fn in_bucket(bucket: impl Into<String>) -> Self {
        Self {
            bucket: Some(bucket.into()),
            name_prefix: None,
        }
    }

    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }
}

/// Keyset-pagination window for listings.
///
/// Results are ordered by file id ascending; `after` is the id of the last
/// file of the previous page. Cursor pagination stays stable under concurrent
/// writes, unlike offsets.
#[derive(Debug, Clone)]
pub struct Page {
    /// Exclusive lower bound on the file id.
    pub after: Option<FileId>,
    /// Maximum number of results; clamped to [`Page::MAX_LIMIT`].
    pub limit: usize,
}

impl Page {
    pub const MAX_LIMIT: usize = 500;

    pub fn first(limit: usize) -> Self {
        Self { after: None, limit }
    }

    pub fn after(cursor: FileId, limit: usize) -> Self {
        Self {
            after: Some(cursor),
            limit,
        }
    }

    /// Limit with the cap applied.
    pub fn effective_limit(&self) -> usize {
        self.limit.min(Self::MAX_LIMIT)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            after: None,
            limit: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = FileId::generate();
        let b = FileId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn metadata_encoding_is_deterministic() {
        let mut first = Metadata::new();
        first.insert("zeta".into(), "1".into());
        first.insert("alpha".into(), "2".into());

        let mut second = Metadata::new();
        second.insert("alpha".into(), "2".into());
        second.insert("zeta".into(), "1".into());

        let a = serde_json::to_string(&first).unwrap();
        let b = serde_json::to_string(&second).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn page_limit_is_clamped() {
        let page = Page::first(10_000);
        assert_eq!(page.effective_limit(), Page::MAX_LIMIT);
    }

    #[test]
    fn description_drops_payload_only() {
        let now = Utc::now();
        let record = FileRecord {
            id: FileId::from("f-1"),
            bucket: "docs".into(),
            name: "readme.md".into(),
            data: b"hello".to_vec(),
            meta: Metadata::new(),
            version: 3,
            created_at: now,
            modified_at: now,
        };
        let description = record.description();
        assert_eq!(description.id, record.id);
        assert_eq!(description.name, record.name);
    }
}
