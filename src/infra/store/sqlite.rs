//! SQLite-backed semaphore store.
//!
//! Every table lives in `<directory>/quota_gate.sqlite3`. Acquire and release are
//! single `UPDATE ... RETURNING` statements, so the capacity check runs inside
//! SQLite's write lock and holds across every connection to the same file,
//! whether in this process or another one. Calls run on the blocking pool.

use std::fs::create_dir_all;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};

use crate::core::{GateError, SemaphoreRecord, SemaphoreStore};
use crate::util::serde::ResourceTypeKey;

/// File name of the database inside the store directory.
pub const DATABASE_FILE: &str = "quota_gate.sqlite3";

fn backend(e: impl std::fmt::Display) -> GateError {
    GateError::StoreUnavailable(e.to_string())
}

/// SQL for one table, rendered once at open.
struct Queries {
    acquire: String,
    release: String,
    upsert: String,
    select_one: String,
    select_all: String,
}

impl Queries {
    fn for_table(table: &str) -> Self {
        let t = format!("\"{}\"", table.replace('"', "\"\""));
        Self {
            acquire: format!(
                "UPDATE {t} SET running_count = running_count + 1 \
                 WHERE resource_type_key = ?1 AND running_count < limit_value \
                 RETURNING running_count"
            ),
            release: format!(
                "UPDATE {t} SET running_count = running_count - 1 \
                 WHERE resource_type_key = ?1 RETURNING running_count"
            ),
            upsert: format!(
                "INSERT INTO {t} (resource_type_key, running_count, limit_value) VALUES (?1, 0, ?2) \
                 ON CONFLICT(resource_type_key) DO UPDATE SET \
                 limit_value = excluded.limit_value, \
                 running_count = CASE WHEN ?3 THEN 0 ELSE running_count END \
                 RETURNING resource_type_key, running_count, limit_value"
            ),
            select_one: format!(
                "SELECT resource_type_key, running_count, limit_value FROM {t} \
                 WHERE resource_type_key = ?1"
            ),
            select_all: format!(
                "SELECT resource_type_key, running_count, limit_value FROM {t} \
                 ORDER BY resource_type_key"
            ),
        }
    }

    fn create(table: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (\
             resource_type_key TEXT PRIMARY KEY NOT NULL, \
             running_count INTEGER NOT NULL DEFAULT 0, \
             limit_value INTEGER NOT NULL CHECK (limit_value >= 0))",
            table.replace('"', "\"\"")
        )
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<SemaphoreRecord> {
    Ok(SemaphoreRecord {
        resource_type_key: ResourceTypeKey::new(row.get::<_, String>(0)?),
        running_count: row.get(1)?,
        limit: row.get(2)?,
    })
}

/// Durable store shared safely by any number of openers of the same directory.
pub struct SqliteSemaphoreStore {
    path: PathBuf,
    table: String,
    conn: Arc<Mutex<Connection>>,
    queries: Arc<Queries>,
    closed: AtomicBool,
}

impl SqliteSemaphoreStore {
    /// Open (or create) `table` in the database under `directory`.
    ///
    /// `busy_timeout` bounds how long a statement waits for another writer
    /// holding the database lock.
    pub fn open(
        directory: impl AsRef<Path>,
        table: &str,
        busy_timeout: Duration,
    ) -> Result<Self, GateError> {
        let directory = directory.as_ref();
        create_dir_all(directory).map_err(backend)?;
        let path = directory.join(DATABASE_FILE);
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )
        .map_err(backend)?;
        conn.busy_timeout(busy_timeout).map_err(backend)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;").map_err(backend)?;
        conn.execute_batch("PRAGMA synchronous = FULL;").map_err(backend)?;
        conn.execute_batch(&Queries::create(table)).map_err(backend)?;
        tracing::debug!("opened semaphore table {} in {}", table, path.display());
        Ok(Self {
            path,
            table: table.to_owned(),
            conn: Arc::new(Mutex::new(conn)),
            queries: Arc::new(Queries::for_table(table)),
            closed: AtomicBool::new(false),
        })
    }

    /// Location of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_open(&self) -> Result<(), GateError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(GateError::StoreUnavailable(format!(
                "table {} has been shut down",
                self.table
            )));
        }
        Ok(())
    }

    /// Run `op` against the connection on the blocking pool.
    async fn blocking<T, F>(&self, op: F) -> Result<T, GateError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &Queries) -> Result<T, GateError> + Send + 'static,
    {
        self.ensure_open()?;
        let conn = Arc::clone(&self.conn);
        let queries = Arc::clone(&self.queries);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            op(&conn, &queries)
        })
        .await
        .map_err(backend)?
    }
}

#[async_trait]
impl SemaphoreStore for SqliteSemaphoreStore {
    async fn try_acquire(&self, key: &ResourceTypeKey) -> Result<i64, GateError> {
        let key = key.clone();
        self.blocking(move |conn, q| {
            let count = conn
                .prepare_cached(&q.acquire)
                .and_then(|mut stmt| {
                    stmt.query_row(params![key.as_str()], |row| row.get::<_, i64>(0))
                        .optional()
                })
                .map_err(backend)?;
            count.ok_or(GateError::QuotaExceeded(key))
        })
        .await
    }

    async fn release(&self, key: &ResourceTypeKey) -> Result<i64, GateError> {
        let key = key.clone();
        self.blocking(move |conn, q| {
            let count = conn
                .prepare_cached(&q.release)
                .and_then(|mut stmt| {
                    stmt.query_row(params![key.as_str()], |row| row.get::<_, i64>(0))
                        .optional()
                })
                .map_err(backend)?;
            count.ok_or(GateError::UnknownResourceType(key))
        })
        .await
    }

    async fn set_limit(
        &self,
        key: &ResourceTypeKey,
        limit: u32,
        reset_running: bool,
    ) -> Result<SemaphoreRecord, GateError> {
        let key = key.clone();
        self.blocking(move |conn, q| {
            conn.query_row(&q.upsert, params![key.as_str(), limit, reset_running], record_from_row)
                .map_err(backend)
        })
        .await
    }

    async fn record(&self, key: &ResourceTypeKey) -> Result<Option<SemaphoreRecord>, GateError> {
        let key = key.clone();
        self.blocking(move |conn, q| {
            conn.query_row(&q.select_one, params![key.as_str()], record_from_row)
                .optional()
                .map_err(backend)
        })
        .await
    }

    async fn snapshot(&self) -> Result<Vec<SemaphoreRecord>, GateError> {
        self.blocking(|conn, q| {
            let mut stmt = conn.prepare(&q.select_all).map_err(backend)?;
            let rows = stmt
                .query_map([], record_from_row)
                .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
                .map_err(backend)?;
            Ok(rows)
        })
        .await
    }

    async fn shutdown(&self) -> Result<(), GateError> {
        self.closed.store(true, Ordering::Release);
        tracing::info!("semaphore table {} in {} closed", self.table, self.path.display());
        Ok(())
    }
}
