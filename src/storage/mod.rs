//! Storage contract implementations.
//!
//! System of record is SQLite with tables:
//! - bucket(code, readonly, created_at, modified_at)
//! - content(uid, bucket_id, name, storage_format, payload, metadata, version, ...)
//! - storage_schema_history(version, name, checksum, applied_at)
//!
//! `MemoryStorage` mirrors the same contract over process-local maps.

pub mod memory;
pub mod row;
pub mod sqlite;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;
