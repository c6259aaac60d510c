//! Short-lived SQLite connections with lock-contention retry.
//!
//! Every store in this crate opens a fresh connection per operation and drops
//! it when the operation returns, so a slow request never holds a write lock
//! across a whole orchestration run.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use rusqlite::{Connection, ErrorCode, OpenFlags};
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};

/// Default busy timeout applied to each connection.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(2_000);

/// Default number of attempts when the database is locked.
pub const DEFAULT_LOCK_RETRIES: u32 = 30;

/// Default delay between lock retries.
pub const DEFAULT_LOCK_RETRY_DELAY: Duration = Duration::from_millis(2_000);

/// Connection tuning shared by all SQLite-backed stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqliteSettings {
    /// SQLite busy handler timeout per statement.
    pub busy_timeout: Duration,
    /// Total attempts for an operation that keeps hitting `SQLITE_BUSY`.
    pub lock_retries: u32,
    /// Fixed back-off between attempts.
    pub retry_delay: Duration,
}

impl Default for SqliteSettings {
    fn default() -> Self {
        Self {
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            lock_retries: DEFAULT_LOCK_RETRIES,
            retry_delay: DEFAULT_LOCK_RETRY_DELAY,
        }
    }
}

impl SqliteSettings {
    /// Settings with no back-off, for tests.
    pub fn immediate() -> Self {
        Self {
            busy_timeout: Duration::from_millis(200),
            lock_retries: 3,
            retry_delay: Duration::from_millis(10),
        }
    }
}

/// A database file plus the settings used to reach it.
#[derive(Debug, Clone)]
pub struct SqliteFile {
    path: PathBuf,
    settings: SqliteSettings,
}

impl SqliteFile {
    /// Create a handle and make sure the parent directory exists.
    pub fn new(path: impl Into<PathBuf>, settings: SqliteSettings) -> DbResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DbError::open(&path, format!("cannot create directory: {}", e)))?;
            }
        }
        Ok(Self { path, settings })
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a fresh connection.
    ///
    /// Read-only connections also set `query_only` so writes fail even if the
    /// caller sneaks a DML statement through.
    pub fn connect(&self, read_only: bool) -> DbResult<Connection> {
        let flags = if read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
        };

        let conn = Connection::open_with_flags(&self.path, flags)
            .map_err(|e| DbError::open(&self.path, e.to_string()))?;
        conn.busy_timeout(self.settings.busy_timeout)?;
        if read_only {
            conn.pragma_update(None, "query_only", true)?;
        }
        Ok(conn)
    }

    /// Run `op` on a fresh connection, retrying while the database is locked.
    pub fn with_connection<T, F>(&self, read_only: bool, mut op: F) -> DbResult<T>
    where
        F: FnMut(&Connection) -> rusqlite::Result<T>,
    {
        let attempts = self.settings.lock_retries.max(1);
        for attempt in 1..=attempts {
            let conn = self.connect(read_only)?;

            match op(&conn) {
                Ok(value) => return Ok(value),
                Err(err) if is_lock_error(&err) => {
                    warn!(
                        "Database {} locked (attempt {}/{}), retrying",
                        self.path.display(),
                        attempt,
                        attempts
                    );
                    drop(conn);
                    if attempt < attempts {
                        thread::sleep(self.settings.retry_delay);
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }

        debug!("Giving up on {} after {} attempts", self.path.display(), attempts);
        Err(DbError::Locked {
            path: self.path.clone(),
            attempts,
        })
    }
}

/// Check whether an error is transient lock contention.
fn is_lock_error(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked)
    )
}
