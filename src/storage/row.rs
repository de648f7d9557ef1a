//! Entity mapping layer: conversion between domain records and their
//! relational rows.
//!
//! Rows are owned exclusively by this module and the adapter; callers never
//! see them. `ContentRow::from_record` and `ContentRow::into_record` are pure
//! inverses over well-formed records: the payload codec is applied
//! symmetrically and metadata JSON is deterministic (ordered map).

use crate::bucket::{FileDescription, FileId, FileRecord, Metadata};
use crate::codec::StorageFormat;
use crate::Result;
use chrono::{DateTime, Utc};

/// Relational form of a [`FileRecord`] in the `content` table.
#[derive(Debug, Clone)]
pub struct ContentRow {
    pub uid: String,
    /// Bucket code, resolved through the `bucket` join.
    pub bucket: String,
    pub name: String,
    pub storage_format: String,
    /// Codec-encoded payload.
    pub payload: Vec<u8>,
    /// Canonical JSON encoding of the metadata map.
    pub metadata: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// Column list matching [`ContentRow::from_sql_row`]; `b` aliases the bucket
/// table, `c` the content table.
pub const CONTENT_COLUMNS: &str =
    "c.uid, b.code, c.name, c.storage_format, c.payload, c.metadata, \
     c.version, c.created_at, c.modified_at";

impl ContentRow {
    /// Map a domain record into its relational form, encoding the payload
    /// with `format` and the metadata as canonical JSON.
    pub fn from_record(record: &FileRecord, format: StorageFormat) -> Result<Self> {
        let payload = format.codec().encode(&record.data)?;
        let metadata = serde_json::to_string(&record.meta)?;
        Ok(Self {
            uid: record.id.to_string(),
            bucket: record.bucket.clone(),
            name: record.name.clone(),
            storage_format: format.as_str().to_string(),
            payload,
            metadata,
            version: record.version,
            created_at: record.created_at,
            modified_at: record.modified_at,
        })
    }

    /// Map back into the domain record, decoding the payload with the format
    /// the row was written with.
    pub fn into_record(self) -> Result<FileRecord> {
        let format: StorageFormat = self.storage_format.parse()?;
        let data = format.codec().decode(&self.payload)?;
        let meta: Metadata = serde_json::from_str(&self.metadata)?;
        Ok(FileRecord {
            id: FileId::from(self.uid),
            bucket: self.bucket,
            name: self.name,
            data,
            meta,
            version: self.version,
            created_at: self.created_at,
            modified_at: self.modified_at,
        })
    }

    /// Map into the payload-free description without touching the codec.
    pub fn into_description(self) -> Result<FileDescription> {
        let meta: Metadata = serde_json::from_str(&self.metadata)?;
        Ok(FileDescription {
            id: FileId::from(self.uid),
            bucket: self.bucket,
            name: self.name,
            meta,
            created_at: self.created_at,
            modified_at: self.modified_at,
        })
    }

    /// Read a row from a query selecting [`CONTENT_COLUMNS`].
    pub fn from_sql_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            uid: row.get(0)?,
            bucket: row.get(1)?,
            name: row.get(2)?,
            storage_format: row.get(3)?,
            payload: row.get(4)?,
            metadata: row.get(5)?,
            version: row.get(6)?,
            created_at: row.get(7)?,
            modified_at: row.get(8)?,
        })
    }
}

/// Relational form of a bucket in the `bucket` table.
#[derive(Debug, Clone)]
pub struct BucketRow {
    pub id: i64,
    pub code: String,
    pub readonly: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl BucketRow {
    /// Read a row from a query selecting
    /// `id, code, readonly, created_at, modified_at`.
    pub fn from_sql_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            code: row.get(1)?,
            readonly: row.get(2)?,
            created_at: row.get(3)?,
            modified_at: row.get(4)?,
        })
    }
}
