//! # storage-local - SQLite-backed local storage service
//!
//! A single-node, relational-database-backed implementation of the bucket/file
//! storage contract:
//!
//! - Versioned schema migrations with a checksummed, append-only history
//! - Bucket and file CRUD with optimistic concurrency control
//! - Pluggable payload codecs (binary, base64, gzip)
//! - Full translation of database failures into the contract error taxonomy
//! - An in-memory contract variant for host test suites
//!
//! ```no_run
//! use storage_local::{BucketStorage, FileStorage, NewFile, SqliteStorage, StorageConfig};
//!
//! # fn main() -> storage_local::Result<()> {
//! let storage = SqliteStorage::open(&StorageConfig::at("storage.db"))?;
//! storage.create_bucket("docs")?;
//! let stored = storage.create(&NewFile::new("docs", "readme.md", b"hello".to_vec()))?;
//! assert_eq!(storage.get(&stored.id)?.unwrap().data, b"hello");
//! # Ok(())
//! # }
//! ```

pub mod bucket;
pub mod codec;
pub mod config;
pub mod contract;
pub mod error;
pub mod migrate;
pub mod storage;

// Re-exports for convenient access
pub use bucket::{Bucket, FileDescription, FileFilter, FileId, FileRecord, Metadata, NewFile, Page};
pub use codec::{StorageCodec, StorageFormat};
pub use config::StorageConfig;
pub use contract::{BucketStorage, FileStorage};
pub use error::StorageError;
pub use migrate::{Migration, Migrator};
pub use storage::{MemoryStorage, SqliteStorage};

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;
