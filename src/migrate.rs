//! Schema migrations.
//!
//! Migrations are embedded, versioned SQL scripts applied exactly once per
//! database. The applied set is recorded in the append-only
//! `storage_schema_history` table together with a blake3 checksum of each
//! script, so a script that changes after being applied is detected at the
//! next startup and treated as fatal.
//!
//! Concurrent starters are serialized through SQLite's write lock: every
//! migration step opens a `BEGIN IMMEDIATE` transaction, retried with bounded
//! backoff while another instance holds the lock.

use crate::error::StorageError;
use crate::Result;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::time::Duration;

/// One versioned unit of schema change.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Strictly increasing, never reused. Gaps are fine.
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
}

impl Migration {
    /// Blake3 checksum of the script text, hex-encoded.
    pub fn checksum(&self) -> String {
        blake3::hash(self.sql.as_bytes()).to_hex().to_string()
    }
}

/// A row of the migration history ledger.
#[derive(Debug, Clone)]
pub struct AppliedMigration {
    pub version: i64,
    pub name: String,
    pub checksum: String,
    pub applied_at: String,
}

/// The migrations this crate ships.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "init_schema",
        sql: r#"
CREATE TABLE bucket (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL UNIQUE,
    readonly INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    modified_at TEXT NOT NULL
);

CREATE TABLE content (
    uid TEXT PRIMARY KEY,
    bucket_id INTEGER NOT NULL REFERENCES bucket(id),
    name TEXT NOT NULL,
    storage_format TEXT NOT NULL,
    payload BLOB NOT NULL,
    metadata TEXT NOT NULL,
    created_at TEXT NOT NULL,
    modified_at TEXT NOT NULL
);

CREATE INDEX idx_content_bucket ON content(bucket_id);
CREATE INDEX idx_content_name ON content(name);
"#,
    },
    Migration {
        version: 2,
        name: "optimistic_lock_version",
        sql: "ALTER TABLE content ADD COLUMN version INTEGER NOT NULL DEFAULT 0;",
    },
];

const CREATE_HISTORY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS storage_schema_history (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    checksum TEXT NOT NULL,
    applied_at TEXT NOT NULL
)
"#;

/// Applies pending migrations and verifies the history ledger.
pub struct Migrator {
    migrations: &'static [Migration],
    lock_attempts: u32,
    lock_backoff: Duration,
}

impl Default for Migrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Migrator {
    /// Migrator over the crate's built-in migrations.
    pub fn new() -> Self {
        Self::with_migrations(MIGRATIONS)
    }

    /// Migrator over an explicit migration set.
    pub fn with_migrations(migrations: &'static [Migration]) -> Self {
        Self {
            migrations,
            lock_attempts: 5,
            lock_backoff: Duration::from_millis(50),
        }
    }

    /// Tune the lock-acquisition retry policy.
    pub fn with_lock_policy(mut self, attempts: u32, backoff: Duration) -> Self {
        self.lock_attempts = attempts.max(1);
        self.lock_backoff = backoff;
        self
    }

    /// Apply every migration not yet recorded in the history ledger.
    ///
    /// Returns the number of migrations applied; zero on an already-migrated
    /// database. Fails fast: the first failing migration rolls back and no
    /// later migration is attempted.
    pub fn apply_pending(&self, conn: &mut Connection) -> Result<usize> {
        self.validate_order()?;

        {
            let tx = self.acquire_lock(conn)?;
            tx.execute_batch(CREATE_HISTORY_TABLE)?;
            tx.commit()?;
        }

        let history = Self::history(conn)?;
        self.verify_checksums(&history)?;

        let highest = history.iter().map(|m| m.version).max().unwrap_or(0);
        let mut applied = 0;

        for migration in self.migrations.iter().filter(|m| m.version > highest) {
            let tx = self.acquire_lock(conn)?;
            if Self::is_recorded(&tx, migration.version)? {
                // Another instance applied it between our history read and
                // taking the lock.
                tx.commit()?;
                continue;
            }

            tx.execute_batch(migration.sql).map_err(|e| {
                tracing::error!(
                    "migration v{} ({}) failed, rolling back: {e}",
                    migration.version,
                    migration.name
                );
                StorageError::MigrationApply {
                    version: migration.version,
                    reason: e.to_string(),
                }
            })?;
            tx.execute(
                "INSERT INTO storage_schema_history (version, name, checksum, applied_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    migration.version,
                    migration.name,
                    migration.checksum(),
                    Utc::now().to_rfc3339(),
                ],
            )?;
            tx.commit()?;

            tracing::info!("applied migration v{} ({})", migration.version, migration.name);
            applied += 1;
        }

        Ok(applied)
    }

    /// Read the full history ledger, oldest first.
    pub fn history(conn: &Connection) -> Result<Vec<AppliedMigration>> {
        let mut stmt = conn.prepare(
            "SELECT version, name, checksum, applied_at
             FROM storage_schema_history ORDER BY version",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(AppliedMigration {
                    version: row.get(0)?,
                    name: row.get(1)?,
                    checksum: row.get(2)?,
                    applied_at: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn validate_order(&self) -> Result<()> {
        for pair in self.migrations.windows(2) {
            if pair[1].version <= pair[0].version {
                return Err(StorageError::MigrationIntegrity {
                    version: pair[1].version,
                    reason: format!(
                        "versions must be strictly increasing, v{} follows v{}",
                        pair[1].version, pair[0].version
                    ),
                });
            }
        }
        Ok(())
    }

    fn verify_checksums(&self, history: &[AppliedMigration]) -> Result<()> {
        for recorded in history {
            let Some(migration) = self
                .migrations
                .iter()
                .find(|m| m.version == recorded.version)
            else {
                continue;
            };
            let computed = migration.checksum();
            if computed != recorded.checksum {
                return Err(StorageError::MigrationIntegrity {
                    version: recorded.version,
                    reason: format!(
                        "checksum mismatch, recorded {} computed {}",
                        recorded.checksum, computed
                    ),
                });
            }
        }
        Ok(())
    }

    fn is_recorded(tx: &Transaction<'_>, version: i64) -> Result<bool> {
        let found = tx
            .query_row(
                "SELECT 1 FROM storage_schema_history WHERE version = ?1",
                [version],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Open a `BEGIN IMMEDIATE` transaction, retrying with linear backoff
    /// while another instance holds the write lock.
    fn acquire_lock<'a>(&self, conn: &'a mut Connection) -> Result<Transaction<'a>> {
        let conn = &*conn;
        let mut attempt: u32 = 0;
        loop {
            match Transaction::new_unchecked(conn, TransactionBehavior::Immediate) {
                Ok(tx) => return Ok(tx),
                Err(e) if is_locked(&e) => {
                    attempt += 1;
                    if attempt >= self.lock_attempts {
                        return Err(StorageError::MigrationLock {
                            attempts: self.lock_attempts,
                        });
                    }
                    tracing::warn!(
                        "migration lock busy, retrying (attempt {attempt}/{})",
                        self.lock_attempts
                    );
                    std::thread::sleep(self.lock_backoff * attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn is_locked(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if matches!(
                failure.code,
                rusqlite::ffi::ErrorCode::DatabaseBusy
                    | rusqlite::ffi::ErrorCode::DatabaseLocked
            )
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_conn() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn applies_all_builtin_migrations_once() {
        let mut conn = open_conn();
        let migrator = Migrator::new();

        let applied = migrator.apply_pending(&mut conn).unwrap();
        assert_eq!(applied, MIGRATIONS.len());

        let history = Migrator::history(&conn).unwrap();
        assert_eq!(history.len(), MIGRATIONS.len());
        for (migration, recorded) in MIGRATIONS.iter().zip(&history) {
            assert_eq!(recorded.version, migration.version);
            assert_eq!(recorded.checksum, migration.checksum());
        }
    }

    #[test]
    fn rerun_is_a_noop() {
        let mut conn = open_conn();
        let migrator = Migrator::new();

        migrator.apply_pending(&mut conn).unwrap();
        let before = Migrator::history(&conn).unwrap();

        let applied = migrator.apply_pending(&mut conn).unwrap();
        assert_eq!(applied, 0);

        let after = Migrator::history(&conn).unwrap();
        assert_eq!(before.len(), after.len());
    }

    #[test]
    fn checksum_mismatch_halts_startup() {
        static ORIGINAL: &[Migration] = &[Migration {
            version: 1,
            name: "one",
            sql: "CREATE TABLE t (id INTEGER PRIMARY KEY);",
        }];
        static TAMPERED: &[Migration] = &[Migration {
            version: 1,
            name: "one",
            sql: "CREATE TABLE t (id INTEGER PRIMARY KEY, extra TEXT);",
        }];

        let mut conn = open_conn();
        Migrator::with_migrations(ORIGINAL)
            .apply_pending(&mut conn)
            .unwrap();

        let err = Migrator::with_migrations(TAMPERED)
            .apply_pending(&mut conn)
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::MigrationIntegrity { version: 1, .. }
        ));
    }

    #[test]
    fn failing_migration_rolls_back_and_aborts() {
        static BROKEN: &[Migration] = &[
            Migration {
                version: 1,
                name: "ok",
                sql: "CREATE TABLE good (id INTEGER PRIMARY KEY);",
            },
            Migration {
                version: 2,
                name: "broken",
                sql: "CREATE TABLE bad (id INTEGER PRIMARY KEY); THIS IS NOT SQL;",
            },
            Migration {
                version: 3,
                name: "never_reached",
                sql: "CREATE TABLE later (id INTEGER PRIMARY KEY);",
            },
        ];

        let mut conn = open_conn();
        let err = Migrator::with_migrations(BROKEN)
            .apply_pending(&mut conn)
            .unwrap_err();
        assert!(matches!(err, StorageError::MigrationApply { version: 2, .. }));

        // v1 committed, v2 rolled back, v3 never attempted.
        let history = Migrator::history(&conn).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].version, 1);

        let bad_exists: Option<()> = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'bad'",
                [],
                |_| Ok(()),
            )
            .optional()
            .unwrap();
        assert!(bad_exists.is_none());
    }

    #[test]
    fn duplicate_versions_are_rejected() {
        static DUPED: &[Migration] = &[
            Migration {
                version: 1,
                name: "a",
                sql: "CREATE TABLE a (id INTEGER);",
            },
            Migration {
                version: 1,
                name: "b",
                sql: "CREATE TABLE b (id INTEGER);",
            },
        ];

        let mut conn = open_conn();
        let err = Migrator::with_migrations(DUPED)
            .apply_pending(&mut conn)
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::MigrationIntegrity { version: 1, .. }
        ));
        assert_eq!(err.code(), "MIGRATION_INTEGRITY");
    }

    #[test]
    fn gap_in_versions_is_tolerated() {
        static GAPPED: &[Migration] = &[
            Migration {
                version: 1,
                name: "first",
                sql: "CREATE TABLE first (id INTEGER);",
            },
            Migration {
                version: 10,
                name: "tenth",
                sql: "CREATE TABLE tenth (id INTEGER);",
            },
        ];

        let mut conn = open_conn();
        let applied = Migrator::with_migrations(GAPPED)
            .apply_pending(&mut conn)
            .unwrap();
        assert_eq!(applied, 2);
    }

    #[test]
    fn held_write_lock_exhausts_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("migrate.db");

        let mut holder = Connection::open(&path).unwrap();
        let _lock = holder
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .unwrap();

        let mut conn = Connection::open(&path).unwrap();
        let err = Migrator::new()
            .with_lock_policy(2, Duration::from_millis(5))
            .apply_pending(&mut conn)
            .unwrap_err();
        assert!(matches!(err, StorageError::MigrationLock { attempts: 2 }));
    }
}
