//! The storage contract: the generic file-CRUD and bucket-administration
//! interfaces this crate implements.
//!
//! Two variants exist: [`crate::storage::SqliteStorage`] (the local,
//! database-backed implementation) and [`crate::storage::MemoryStorage`]
//! (for host test suites). Both are used through these traits, so hosts can
//! swap variants without touching call sites.

use crate::bucket::{Bucket, FileDescription, FileFilter, FileId, FileRecord, NewFile, Page};
use crate::Result;

/// File CRUD operations.
///
/// Every mutating operation runs inside a single transaction; on failure the
/// transaction rolls back entirely and no partial write is observable.
pub trait FileStorage: Send + Sync {
    /// Store a new file and return the stored record (version 0).
    ///
    /// Fails with `Validation` when the name is empty, `BucketNotFound` when
    /// the bucket does not exist, `BucketReadOnly` when it is frozen, and
    /// `DuplicateKey` when the generated identifier collides.
    fn create(&self, file: &NewFile) -> Result<FileRecord>;

    /// Fetch a file by id. Absence is not an error.
    fn get(&self, id: &FileId) -> Result<Option<FileRecord>>;

    /// Fetch the description of a file without decoding its payload.
    fn describe(&self, id: &FileId) -> Result<Option<FileDescription>>;

    /// Overwrite a file, conditioned on the optimistic-lock version.
    ///
    /// The write succeeds only while the stored version equals
    /// `record.version`; on success the stored version is incremented and the
    /// updated record returned. A stale version fails with `Conflict`; a
    /// missing record fails with `NotFound`.
    fn update(&self, record: &FileRecord) -> Result<FileRecord>;

    /// Delete a file by id.
    ///
    /// Deleting a non-existent id is a documented no-op: the call returns
    /// `Ok(())` and changes nothing, however often it is repeated. Deleting
    /// from a readonly bucket fails with `BucketReadOnly`.
    fn delete(&self, id: &FileId) -> Result<()>;

    /// Whether a file with this id exists.
    fn exists(&self, id: &FileId) -> Result<bool>;

    /// List file descriptions matching `filter`, ordered by id ascending.
    ///
    /// Pagination is cursor-based: pass the last id of the previous page as
    /// `page.after`. Each call re-queries from scratch, so the sequence is
    /// restartable but not resumable mid-stream.
    fn list(&self, filter: &FileFilter, page: &Page) -> Result<Vec<FileDescription>>;
}

/// Bucket administration operations.
pub trait BucketStorage: Send + Sync {
    /// Create a bucket. Creating an existing bucket is a no-op.
    fn create_bucket(&self, code: &str) -> Result<()>;

    /// Fetch a bucket together with the descriptions of its contents.
    fn get_bucket(&self, code: &str) -> Result<Bucket>;

    /// Freeze or unfreeze a bucket. Setting the current state is a no-op.
    fn set_read_only(&self, code: &str, readonly: bool) -> Result<()>;

    /// Delete a bucket. Absent buckets are a no-op; non-empty buckets fail
    /// with `BucketNotEmpty`.
    fn delete_bucket(&self, code: &str) -> Result<()>;
}
