//! Error taxonomy of the storage contract and the translation boundary
//! between raw database failures and contract error kinds.
//!
//! No `rusqlite::Error` ever crosses into caller code: every database-facing
//! function funnels failures through [`translate_db_error`] (or a `#[from]`
//! conversion that calls it) before returning.

use rusqlite::ffi::ErrorCode;

/// Errors produced by the storage contract implementations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Bad input from the caller, not retryable.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A record with the same identifier already exists.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// Optimistic-lock version mismatch: another writer won the race.
    /// Callers should re-fetch and retry.
    #[error("version conflict on {id}: stored version {stored}, caller had {expected}")]
    Conflict {
        id: String,
        expected: i64,
        stored: i64,
    },

    /// The record required by the operation does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The named bucket does not exist.
    #[error("bucket does not exist: {0}")]
    BucketNotFound(String),

    /// The bucket still holds content and cannot be deleted.
    #[error("bucket not empty: {0}")]
    BucketNotEmpty(String),

    /// The bucket is in read-only mode and rejects writes.
    #[error("bucket is readonly: {0}")]
    BucketReadOnly(String),

    /// A foreign-key reference was violated.
    #[error("reference violation: {0}")]
    Reference(String),

    /// Transient infrastructure failure (busy database, lost connection).
    /// Retryable with backoff.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A statement or transaction timed out; the transaction was rolled back.
    #[error("storage operation timed out: {0}")]
    Timeout(String),

    /// Payload or metadata encode/decode failure. Not retryable; indicates
    /// data corruption or version skew, never a database fault.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The embedded migration set or its recorded history is corrupt: a
    /// previously applied migration no longer matches its checksum, or the
    /// set itself repeats or reorders a version. Fatal at startup.
    #[error("migration v{version} integrity violation: {reason}")]
    MigrationIntegrity { version: i64, reason: String },

    /// A migration failed mid-flight; its transaction was rolled back and
    /// the run aborted. Fatal at startup.
    #[error("migration v{version} failed: {reason}")]
    MigrationApply { version: i64, reason: String },

    /// Could not take the migration lock within the configured attempts.
    /// Fatal at startup.
    #[error("migration lock not acquired after {attempts} attempts")]
    MigrationLock { attempts: u32 },

    /// Catch-all for failures no rule classifies. Always logged with
    /// context at the boundary; never used to mask a known kind.
    #[error("unexpected storage error: {0}")]
    Unknown(String),
}

impl StorageError {
    /// Stable contract-level error code for this kind.
    pub fn code(&self) -> &'static str {
        match self {
            StorageError::Validation(_) => "VALIDATION_ERROR",
            StorageError::DuplicateKey(_) => "DUPLICATE_KEY",
            StorageError::Conflict { .. } => "CONFLICT",
            StorageError::NotFound(_) => "NOT_FOUND",
            StorageError::BucketNotFound(_) => "BUCKET_NOT_FOUND",
            StorageError::BucketNotEmpty(_) => "BUCKET_NOT_EMPTY",
            StorageError::BucketReadOnly(_) => "BUCKET_READONLY",
            StorageError::Reference(_) => "REFERENCE_VIOLATION",
            StorageError::Unavailable(_) => "UNAVAILABLE",
            StorageError::Timeout(_) => "TIMEOUT",
            StorageError::Serialization(_) => "SERIALIZATION_ERROR",
            StorageError::MigrationIntegrity { .. } => "MIGRATION_INTEGRITY",
            StorageError::MigrationApply { .. } => "MIGRATION_APPLY",
            StorageError::MigrationLock { .. } => "MIGRATION_LOCK",
            StorageError::Unknown(_) => "UNKNOWN",
        }
    }

    /// Whether the caller may retry the operation (with backoff).
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            StorageError::Unavailable(_) | StorageError::Timeout(_)
        )
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        translate_db_error(err)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Classify a raw `rusqlite` failure into a contract error kind.
///
/// Unique/primary-key constraint violations become [`StorageError::DuplicateKey`],
/// foreign-key violations become [`StorageError::Reference`], other constraint
/// failures become [`StorageError::Validation`], and busy/locked databases
/// become [`StorageError::Unavailable`]. Anything unclassified is logged here
/// and returned as [`StorageError::Unknown`].
pub fn translate_db_error(err: rusqlite::Error) -> StorageError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, message) => {
            let detail = message
                .clone()
                .unwrap_or_else(|| failure.to_string());
            match failure.code {
                ErrorCode::ConstraintViolation => {
                    // Extended result codes distinguish the constraint class.
                    match failure.extended_code {
                        rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                            StorageError::DuplicateKey(detail)
                        }
                        rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                            StorageError::Reference(detail)
                        }
                        _ => StorageError::Validation(detail),
                    }
                }
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                    StorageError::Unavailable(detail)
                }
                ErrorCode::OperationInterrupted => StorageError::Timeout(detail),
                ErrorCode::CannotOpen | ErrorCode::NotADatabase => {
                    StorageError::Unavailable(detail)
                }
                _ => {
                    tracing::error!("unclassified sqlite failure: {err}");
                    StorageError::Unknown(err.to_string())
                }
            }
        }
        rusqlite::Error::FromSqlConversionFailure(..)
        | rusqlite::Error::IntegralValueOutOfRange(..)
        | rusqlite::Error::InvalidColumnType(..) => {
            StorageError::Serialization(err.to_string())
        }
        rusqlite::Error::QueryReturnedNoRows => {
            StorageError::NotFound(err.to_string())
        }
        _ => {
            tracing::error!("unclassified database error: {err}");
            StorageError::Unknown(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(code: ErrorCode, extended: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code,
                extended_code: extended,
            },
            Some("boom".into()),
        )
    }

    #[test]
    fn unique_violation_translates_to_duplicate_key() {
        let err = sqlite_failure(
            ErrorCode::ConstraintViolation,
            rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE,
        );
        assert!(matches!(
            translate_db_error(err),
            StorageError::DuplicateKey(_)
        ));
    }

    #[test]
    fn foreign_key_violation_translates_to_reference() {
        let err = sqlite_failure(
            ErrorCode::ConstraintViolation,
            rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY,
        );
        assert!(matches!(
            translate_db_error(err),
            StorageError::Reference(_)
        ));
    }

    #[test]
    fn busy_database_is_retryable() {
        let err = sqlite_failure(
            ErrorCode::DatabaseBusy,
            rusqlite::ffi::SQLITE_BUSY,
        );
        let translated = translate_db_error(err);
        assert!(matches!(translated, StorageError::Unavailable(_)));
        assert!(translated.retryable());
    }

    #[test]
    fn unclassified_failure_is_logged_at_the_boundary() {
        use std::io::Write;
        use std::sync::{Arc, Mutex};

        #[derive(Clone, Default)]
        struct Capture(Arc<Mutex<Vec<u8>>>);

        impl Write for Capture {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for Capture {
            type Writer = Capture;

            fn make_writer(&'a self) -> Self::Writer {
                self.clone()
            }
        }

        let capture = Capture::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_ansi(false)
            .finish();

        let translated = tracing::subscriber::with_default(subscriber, || {
            translate_db_error(sqlite_failure(
                ErrorCode::InternalMalfunction,
                rusqlite::ffi::SQLITE_INTERNAL,
            ))
        });

        assert!(matches!(translated, StorageError::Unknown(_)));
        let logged = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("ERROR"));
        assert!(logged.contains("unclassified sqlite failure"));
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(StorageError::Validation("x".into()).code(), "VALIDATION_ERROR");
        assert_eq!(
            StorageError::Conflict {
                id: "f".into(),
                expected: 0,
                stored: 1
            }
            .code(),
            "CONFLICT"
        );
        assert_eq!(
            StorageError::MigrationLock { attempts: 3 }.code(),
            "MIGRATION_LOCK"
        );
    }
}
