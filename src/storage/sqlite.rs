//! SQLite implementation of the storage contract.
//!
//! One connection behind a mutex; every mutating operation runs in its own
//! transaction and rolls back on any failure path (dropping an uncommitted
//! `rusqlite::Transaction` rolls it back). Migrations run inside `open`, so
//! an adapter instance never serves an unmigrated schema.

use crate::bucket::{
    Bucket, FileDescription, FileFilter, FileId, FileRecord, NewFile, Page,
};
use crate::codec::StorageFormat;
use crate::config::StorageConfig;
use crate::contract::{BucketStorage, FileStorage};
use crate::error::StorageError;
use crate::migrate::Migrator;
use crate::storage::row::{BucketRow, ContentRow, CONTENT_COLUMNS};
use crate::Result;
use chrono::Utc;
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// The local, SQLite-backed storage adapter.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
    default_format: StorageFormat,
}

impl SqliteStorage {
    /// Open (or create) the database named by `config`, run pending
    /// migrations, and return a ready adapter.
    pub fn open(config: &StorageConfig) -> Result<Self> {
        crate::config::ensure_db_dir(&config.database).map_err(|e| {
            StorageError::Unavailable(format!(
                "cannot create directory for {}: {e}",
                config.database.display()
            ))
        })?;
        let conn = Connection::open(&config.database).map_err(|e| {
            StorageError::Unavailable(format!(
                "cannot open database {}: {e}",
                config.database.display()
            ))
        })?;
        Self::initialize(conn, config)
    }

    /// Open an in-memory database (for testing and ephemeral hosts).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn, &StorageConfig::default())
    }

    fn initialize(conn: Connection, config: &StorageConfig) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;

        let mut conn = conn;
        Migrator::new()
            .with_lock_policy(
                config.migration_lock_attempts,
                Duration::from_millis(config.migration_lock_backoff_ms),
            )
            .apply_pending(&mut conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            default_format: config.default_format,
        })
    }

    /// The codec format applied to newly written payloads.
    pub fn default_format(&self) -> StorageFormat {
        self.default_format
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn find_bucket(tx: &Transaction<'_>, code: &str) -> Result<Option<BucketRow>> {
        tx.query_row(
            "SELECT id, code, readonly, created_at, modified_at FROM bucket WHERE code = ?1",
            [code],
            BucketRow::from_sql_row,
        )
        .optional()
        .map_err(Into::into)
    }

    fn fetch_row(conn: &Connection, id: &FileId) -> Result<Option<ContentRow>> {
        let sql = format!(
            "SELECT {CONTENT_COLUMNS} FROM content c \
             JOIN bucket b ON b.id = c.bucket_id WHERE c.uid = ?1"
        );
        conn.query_row(&sql, [id.as_str()], ContentRow::from_sql_row)
            .optional()
            .map_err(Into::into)
    }
}

impl FileStorage for SqliteStorage {
    fn create(&self, file: &NewFile) -> Result<FileRecord> {
        if file.name.trim().is_empty() {
            return Err(StorageError::Validation("file name must not be empty".into()));
        }
        if file.bucket.trim().is_empty() {
            return Err(StorageError::Validation("bucket code must not be empty".into()));
        }

        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let bucket = Self::find_bucket(&tx, &file.bucket)?
            .ok_or_else(|| StorageError::BucketNotFound(file.bucket.clone()))?;
        if bucket.readonly {
            return Err(StorageError::BucketReadOnly(bucket.code));
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
        let row = ContentRow::from_record(&record, self.default_format)?;

        tx.execute(
            "INSERT INTO content \
             (uid, bucket_id, name, storage_format, payload, metadata, version, created_at, modified_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                row.uid,
                bucket.id,
                row.name,
                row.storage_format,
                row.payload,
                row.metadata,
                row.version,
                row.created_at,
                row.modified_at,
            ],
        )?;
        tx.commit()?;

        Ok(record)
    }

    fn get(&self, id: &FileId) -> Result<Option<FileRecord>> {
        let conn = self.lock();
        Self::fetch_row(&conn, id)?
            .map(ContentRow::into_record)
            .transpose()
    }

    fn describe(&self, id: &FileId) -> Result<Option<FileDescription>> {
        let conn = self.lock();
        Self::fetch_row(&conn, id)?
            .map(ContentRow::into_description)
            .transpose()
    }

    fn update(&self, record: &FileRecord) -> Result<FileRecord> {
        if record.name.trim().is_empty() {
            return Err(StorageError::Validation("file name must not be empty".into()));
        }

        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let current = tx
            .query_row(
                "SELECT c.version, c.created_at, b.code, b.readonly \
                 FROM content c JOIN bucket b ON b.id = c.bucket_id \
                 WHERE c.uid = ?1",
                [record.id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, chrono::DateTime<Utc>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, bool>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((stored_version, created_at, bucket_code, readonly)) = current else {
            return Err(StorageError::NotFound(record.id.to_string()));
        };
        if readonly {
            return Err(StorageError::BucketReadOnly(bucket_code));
        }
        if bucket_code != record.bucket {
            return Err(StorageError::Validation(format!(
                "file {} belongs to bucket '{bucket_code}', not '{}'",
                record.id, record.bucket
            )));
        }

        let now = Utc::now();
        let row = ContentRow::from_record(record, self.default_format)?;

        // Conditional write: only the writer holding the stored version wins.
        let affected = tx.execute(
            "UPDATE content \
             SET name = ?1, storage_format = ?2, payload = ?3, metadata = ?4, \
                 version = version + 1, modified_at = ?5 \
             WHERE uid = ?6 AND version = ?7",
            params![
                row.name,
                row.storage_format,
                row.payload,
                row.metadata,
                now,
                record.id.as_str(),
                record.version,
            ],
        )?;
        if affected == 0 {
            return Err(StorageError::Conflict {
                id: record.id.to_string(),
                expected: record.version,
                stored: stored_version,
            });
        }
        tx.commit()?;

        Ok(FileRecord {
            version: record.version + 1,
            created_at,
            modified_at: now,
            ..record.clone()
        })
    }

    fn delete(&self, id: &FileId) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let found = tx
            .query_row(
                "SELECT b.code, b.readonly FROM content c \
                 JOIN bucket b ON b.id = c.bucket_id WHERE c.uid = ?1",
                [id.as_str()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?)),
            )
            .optional()?;

        match found {
            // Deleting a non-existent id is a documented no-op.
            None => Ok(()),
            Some((code, true)) => Err(StorageError::BucketReadOnly(code)),
            Some((_, false)) => {
                tx.execute("DELETE FROM content WHERE uid = ?1", [id.as_str()])?;
                tx.commit()?;
                Ok(())
            }
        }
    }

    fn exists(&self, id: &FileId) -> Result<bool> {
        let conn = self.lock();
        let found = conn
            .query_row(
                "SELECT 1 FROM content WHERE uid = ?1",
                [id.as_str()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn list(&self, filter: &FileFilter, page: &Page) -> Result<Vec<FileDescription>> {
        let mut sql = format!(
            "SELECT {CONTENT_COLUMNS} FROM content c JOIN bucket b ON b.id = c.bucket_id"
        );

        let prefix = filter
            .name_prefix
            .as_deref()
            .map(|p| format!("{}%", escape_like(p)));
        let after = page.after.as_ref().map(ToString::to_string);
        let limit = page.effective_limit() as i64;

        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<&dyn ToSql> = Vec::new();
        if let Some(bucket) = &filter.bucket {
            clauses.push(format!("b.code = ?{}", values.len() + 1));
            values.push(bucket);
        }
        if let Some(prefix) = &prefix {
            clauses.push(format!("c.name LIKE ?{} ESCAPE '\\'", values.len() + 1));
            values.push(prefix);
        }
        if let Some(after) = &after {
            clauses.push(format!("c.uid > ?{}", values.len() + 1));
            values.push(after);
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(&format!(" ORDER BY c.uid ASC LIMIT ?{}", values.len() + 1));
        values.push(&limit);

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(values.as_slice(), ContentRow::from_sql_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(ContentRow::into_description)
            .collect()
    }
}

impl BucketStorage for SqliteStorage {
    fn create_bucket(&self, code: &str) -> Result<()> {
        if code.trim().is_empty() {
            return Err(StorageError::Validation("bucket code must not be empty".into()));
        }
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let now = Utc::now();
        tx.execute(
            "INSERT OR IGNORE INTO bucket (code, readonly, created_at, modified_at) \
             VALUES (?1, 0, ?2, ?3)",
            params![code, now, now],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn get_bucket(&self, code: &str) -> Result<Bucket> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let bucket = Self::find_bucket(&tx, code)?
            .ok_or_else(|| StorageError::BucketNotFound(code.to_string()))?;

        let sql = format!(
            "SELECT {CONTENT_COLUMNS} FROM content c \
             JOIN bucket b ON b.id = c.bucket_id \
             WHERE c.bucket_id = ?1 ORDER BY c.uid ASC"
        );
        let mut stmt = tx.prepare(&sql)?;
        let rows = stmt
            .query_map([bucket.id], ContentRow::from_sql_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        drop(stmt);

        let contents = rows
            .into_iter()
            .map(ContentRow::into_description)
            .collect::<Result<Vec<_>>>()?;

        Ok(Bucket {
            code: bucket.code,
            readonly: bucket.readonly,
            created_at: bucket.created_at,
            modified_at: bucket.modified_at,
            contents,
        })
    }

    fn set_read_only(&self, code: &str, readonly: bool) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let bucket = Self::find_bucket(&tx, code)?
            .ok_or_else(|| StorageError::BucketNotFound(code.to_string()))?;

        if bucket.readonly != readonly {
            tx.execute(
                "UPDATE bucket SET readonly = ?1, modified_at = ?2 WHERE id = ?3",
                params![readonly, Utc::now(), bucket.id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_bucket(&self, code: &str) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let Some(bucket) = Self::find_bucket(&tx, code)? else {
            return Ok(());
        };

        let contents: i64 = tx.query_row(
            "SELECT COUNT(*) FROM content WHERE bucket_id = ?1",
            [bucket.id],
            |row| row.get(0),
        )?;
        if contents > 0 {
            return Err(StorageError::BucketNotEmpty(code.to_string()));
        }

        tx.execute("DELETE FROM bucket WHERE id = ?1", [bucket.id])?;
        tx.commit()?;
        Ok(())
    }
}

/// Escape `%`, `_`, and the escape character itself for a LIKE pattern.
fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
