//! SQLite storage engine for request logs
//!
//! This module provides async database operations with:
//! - Connection pooling (WAL mode for concurrent reads/writes)
//! - Self-initializing schema with additive column upgrades
//! - Atomic single-statement inserts and deletes
//! - An exclusive lock file so only one store writes to a path at a time

use crate::error::{Result, TrackError};
use crate::store::record::{from_millis, LogRecord, NewLogRecord};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// In-memory database marker accepted by [`LogStore::open`]
pub const MEMORY_PATH: &str = ":memory:";

/// SQLite caps bound parameters per statement; id deletes are chunked below it.
const DELETE_CHUNK_SIZE: usize = 500;

const SELECT_COLUMNS: &str = "SELECT id, path, path_pattern, method, status_code, timestamp, \
     client_ip, duration_ms, user_agent, referer, query_params, path_params, request_body, \
     response_size, user_id, role, trace_id, client_identifier_hash, created_at \
     FROM request_logs";

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS request_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL,
    path_pattern TEXT NOT NULL,
    method TEXT NOT NULL,
    status_code INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,
    client_ip TEXT,
    duration_ms REAL,
    user_agent TEXT,
    referer TEXT,
    query_params TEXT NOT NULL DEFAULT '{}',
    path_params TEXT NOT NULL DEFAULT '{}',
    request_body TEXT NOT NULL DEFAULT '{}',
    response_size INTEGER NOT NULL DEFAULT 0,
    user_id TEXT,
    role TEXT,
    trace_id TEXT NOT NULL,
    created_at INTEGER NOT NULL
)
"#;

/// Columns added after the first schema version. Older stores get them via
/// `ALTER TABLE`, and an "already exists" failure is ignored.
const OPTIONAL_COLUMNS: &[(&str, &str)] = &[("client_identifier_hash", "TEXT")];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_request_logs_created_at ON request_logs (created_at)",
    "CREATE INDEX IF NOT EXISTS idx_request_logs_timestamp ON request_logs (timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_request_logs_path_pattern ON request_logs (path_pattern)",
    "CREATE INDEX IF NOT EXISTS idx_request_logs_status_code ON request_logs (status_code)",
    "CREATE INDEX IF NOT EXISTS idx_request_logs_client_hash ON request_logs (client_identifier_hash)",
];

/// Connection settings for a [`LogStore`]
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// SQLite file path, or `:memory:`
    pub database_path: String,
    pub max_connections: u32,
    pub busy_timeout: Duration,
    /// Open an existing file without taking the write lock; writes fail
    pub read_only: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            database_path: "devtrack_logs.db".to_string(),
            max_connections: 5,
            busy_timeout: Duration::from_secs(30),
            read_only: false,
        }
    }
}

impl StoreOptions {
    pub fn new(database_path: impl Into<String>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Default::default()
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    fn is_memory(&self) -> bool {
        self.database_path == MEMORY_PATH || self.database_path.starts_with("sqlite::memory:")
    }
}

/// Request log store handle
///
/// Owns the SQLite connection pool. Share it as `Arc<LogStore>`; the pool
/// serializes concurrent inserts, queries and deletes.
pub struct LogStore {
    pool: SqlitePool,
    database_path: String,
    lock: Mutex<Option<File>>,
    closed: AtomicBool,
}

impl LogStore {
    /// Open (or create) a store at `database_path` with default pool settings
    ///
    /// # Example
    ///
    /// ```ignore
    /// let store = LogStore::open("./data/devtrack_logs.db").await?;
    /// ```
    pub async fn open(database_path: &str) -> Result<Self> {
        Self::open_with(StoreOptions::new(database_path)).await
    }

    /// In-memory store, mostly for tests
    pub async fn open_in_memory() -> Result<Self> {
        Self::open(MEMORY_PATH).await
    }

    pub async fn open_with(options: StoreOptions) -> Result<Self> {
        let (pool, lock) = if options.is_memory() {
            let connect = SqliteConnectOptions::from_str("sqlite::memory:")?;

            // Every in-memory connection is its own database, so keep exactly
            // one connection alive for the lifetime of the pool.
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(connect)
                .await?;
            (pool, None)
        } else if options.read_only {
            let connect = SqliteConnectOptions::new()
                .filename(&options.database_path)
                .read_only(true)
                .busy_timeout(options.busy_timeout);

            let pool = SqlitePoolOptions::new()
                .max_connections(options.max_connections.max(1))
                .acquire_timeout(options.busy_timeout)
                .connect_with(connect)
                .await?;
            (pool, None)
        } else {
            let path = Path::new(&options.database_path);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let lock = acquire_write_lock(path)?;

            let connect = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
                .busy_timeout(options.busy_timeout);

            let pool = SqlitePoolOptions::new()
                .max_connections(options.max_connections.max(1))
                .acquire_timeout(options.busy_timeout)
                .connect_with(connect)
                .await?;
            (pool, Some(lock))
        };

        if !options.read_only || options.is_memory() {
            Self::initialize_schema(&pool).await?;
        }

        tracing::info!(
            database = %options.database_path,
            read_only = options.read_only,
            "Request log store opened"
        );

        Ok(Self {
            pool,
            database_path: options.database_path,
            lock: Mutex::new(lock),
            closed: AtomicBool::new(false),
        })
    }

    /// Create tables and indexes if absent, then add any missing optional columns
    async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(CREATE_TABLE).execute(pool).await?;

        for (column, column_type) in OPTIONAL_COLUMNS {
            let statement = format!("ALTER TABLE request_logs ADD COLUMN {} {}", column, column_type);
            match sqlx::query(&statement).execute(pool).await {
                Ok(_) => tracing::info!(column = %column, "Added column to request_logs"),
                Err(sqlx::Error::Database(e)) if e.message().contains("duplicate column") => {}
                Err(e) => return Err(e.into()),
            }
        }

        for index in INDEXES {
            sqlx::query(index).execute(pool).await?;
        }

        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(TrackError::Closed)
        } else {
            Ok(())
        }
    }

    /// Insert a log entry and return its assigned id
    ///
    /// The row is written by a single statement, so a failure leaves nothing behind.
    pub async fn insert(&self, record: &NewLogRecord) -> Result<i64> {
        self.ensure_open()?;
        record.validate()?;

        let query_params = serde_json::to_string(&record.query_params)
            .map_err(|e| TrackError::json("query_params", e))?;
        let path_params = serde_json::to_string(&record.path_params)
            .map_err(|e| TrackError::json("path_params", e))?;
        let request_body = serde_json::to_string(&record.request_body)
            .map_err(|e| TrackError::json("request_body", e))?;
        let trace_id = record
            .trace_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let result = sqlx::query(
            r#"
            INSERT INTO request_logs (
                path, path_pattern, method, status_code, timestamp, client_ip,
                duration_ms, user_agent, referer, query_params, path_params,
                request_body, response_size, user_id, role, trace_id,
                client_identifier_hash, created_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                MAX(?18, COALESCE((SELECT MAX(created_at) FROM request_logs), 0))
            )
            "#,
        )
        .bind(&record.path)
        .bind(&record.path_pattern)
        .bind(&record.method)
        .bind(record.status_code as i64)
        .bind(record.timestamp.timestamp_millis())
        .bind(&record.client_ip)
        .bind(record.duration_ms)
        .bind(&record.user_agent)
        .bind(&record.referer)
        .bind(&query_params)
        .bind(&path_params)
        .bind(&request_body)
        .bind(record.response_size as i64)
        .bind(&record.user_id)
        .bind(&record.role)
        .bind(&trace_id)
        .bind(&record.client_identifier_hash)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// All logs, most recent first. `limit = None` means unbounded.
    pub async fn get_all(&self, limit: Option<u32>, offset: u32) -> Result<Vec<LogRecord>> {
        self.ensure_open()?;

        let sql = format!("{} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?", SELECT_COLUMNS);
        let rows = sqlx::query(&sql)
            .bind(limit_param(limit))
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Logs whose route template equals `path_pattern`, most recent first
    pub async fn get_by_path_pattern(
        &self,
        path_pattern: &str,
        limit: Option<u32>,
    ) -> Result<Vec<LogRecord>> {
        self.ensure_open()?;

        let sql = format!(
            "{} WHERE path_pattern = ? ORDER BY created_at DESC, id DESC LIMIT ?",
            SELECT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(path_pattern)
            .bind(limit_param(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Logs with the given response status, most recent first
    pub async fn get_by_status_code(
        &self,
        status_code: u16,
        limit: Option<u32>,
    ) -> Result<Vec<LogRecord>> {
        self.ensure_open()?;

        let sql = format!(
            "{} WHERE status_code = ? ORDER BY created_at DESC, id DESC LIMIT ?",
            SELECT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(status_code as i64)
            .bind(limit_param(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Number of stored logs
    pub async fn count(&self) -> Result<u64> {
        self.ensure_open()?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM request_logs")
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }

    pub async fn delete_all(&self) -> Result<u64> {
        self.ensure_open()?;

        let result = sqlx::query("DELETE FROM request_logs")
            .execute(&self.pool)
            .await?;

        tracing::info!(deleted = result.rows_affected(), "Deleted all request logs");
        Ok(result.rows_affected())
    }

    pub async fn delete_by_path_pattern(&self, path_pattern: &str) -> Result<u64> {
        self.ensure_open()?;

        let result = sqlx::query("DELETE FROM request_logs WHERE path_pattern = ?")
            .bind(path_pattern)
            .execute(&self.pool)
            .await?;

        tracing::info!(
            path_pattern = %path_pattern,
            deleted = result.rows_affected(),
            "Deleted request logs by path pattern"
        );
        Ok(result.rows_affected())
    }

    pub async fn delete_by_status_code(&self, status_code: u16) -> Result<u64> {
        self.ensure_open()?;

        let result = sqlx::query("DELETE FROM request_logs WHERE status_code = ?")
            .bind(status_code as i64)
            .execute(&self.pool)
            .await?;

        tracing::info!(
            status_code = status_code,
            deleted = result.rows_affected(),
            "Deleted request logs by status code"
        );
        Ok(result.rows_affected())
    }

    /// Delete logs whose event timestamp is more than `days` days old
    pub async fn delete_older_than(&self, days: u32) -> Result<u64> {
        self.ensure_open()?;

        // a cutoff before the earliest representable instant matches nothing
        let cutoff = ChronoDuration::try_days(i64::from(days))
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let result = sqlx::query("DELETE FROM request_logs WHERE timestamp < ?")
            .bind(cutoff.timestamp_millis())
            .execute(&self.pool)
            .await?;

        tracing::info!(
            older_than_days = days,
            deleted = result.rows_affected(),
            "Deleted old request logs"
        );
        Ok(result.rows_affected())
    }

    /// Delete logs with an event timestamp in `[start, end]`
    pub async fn delete_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u64> {
        self.ensure_open()?;
        if start > end {
            return Err(TrackError::validation("start must not be after end"));
        }

        let result = sqlx::query("DELETE FROM request_logs WHERE timestamp BETWEEN ? AND ?")
            .bind(start.timestamp_millis())
            .bind(end.timestamp_millis())
            .execute(&self.pool)
            .await?;

        tracing::info!(
            start = %start,
            end = %end,
            deleted = result.rows_affected(),
            "Deleted request logs by date range"
        );
        Ok(result.rows_affected())
    }

    pub async fn delete_by_id(&self, id: i64) -> Result<u64> {
        self.ensure_open()?;

        let result = sqlx::query("DELETE FROM request_logs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        tracing::debug!(log_id = id, deleted = result.rows_affected(), "Deleted request log");
        Ok(result.rows_affected())
    }

    /// Delete every log whose id is in `ids`, in one transaction
    pub async fn delete_by_ids(&self, ids: &[i64]) -> Result<u64> {
        self.ensure_open()?;
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut deleted = 0;

        for chunk in ids.chunks(DELETE_CHUNK_SIZE) {
            let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM request_logs WHERE id IN (");
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");

            deleted += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;

        tracing::info!(requested = ids.len(), deleted = deleted, "Deleted request logs by id");
        Ok(deleted)
    }

    /// Store statistics for CLI/health output
    pub async fn stats(&self) -> Result<StoreStats> {
        self.ensure_open()?;

        let (count, oldest, newest): (i64, Option<i64>, Option<i64>) =
            sqlx::query_as("SELECT COUNT(*), MIN(timestamp), MAX(timestamp) FROM request_logs")
                .fetch_one(&self.pool)
                .await?;

        Ok(StoreStats {
            record_count: count as u64,
            database_path: self.database_path.clone(),
            oldest_timestamp: oldest.map(from_millis),
            newest_timestamp: newest.map(from_millis),
        })
    }

    /// Close the pool and release the write lock. Calling it again is a no-op.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.pool.close().await;

        let lock = match self.lock.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(file) = lock {
            if let Err(e) = FileExt::unlock(&file) {
                tracing::warn!(error = %e, "Failed to release store lock file");
            }
        }

        tracing::info!(database = %self.database_path, "Request log store closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn database_path(&self) -> &str {
        &self.database_path
    }

    /// Get the underlying connection pool (for advanced usage)
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub(crate) fn ensure_open_for_query(&self) -> Result<()> {
        self.ensure_open()
    }
}

/// Store statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub record_count: u64,
    pub database_path: String,
    pub oldest_timestamp: Option<DateTime<Utc>>,
    pub newest_timestamp: Option<DateTime<Utc>>,
}

fn lock_path(database_path: &Path) -> PathBuf {
    let mut name = database_path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

fn acquire_write_lock(database_path: &Path) -> Result<File> {
    let path = lock_path(database_path);

    #[allow(clippy::suspicious_open_options)]
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&path)?;

    file.try_lock_exclusive()
        .map_err(|_| TrackError::Locked(database_path.to_path_buf()))?;

    Ok(file)
}

/// SQLite treats a negative LIMIT as "no limit"
fn limit_param(limit: Option<u32>) -> i64 {
    limit.map(i64::from).unwrap_or(-1)
}

fn json_object(row: &SqliteRow, column: &'static str) -> Result<Map<String, Value>> {
    let raw: String = row.try_get(column)?;
    serde_json::from_str(&raw).map_err(|e| TrackError::json(column, e))
}

/// Reconstruct a [`LogRecord`] from a SQLite row
pub(crate) fn record_from_row(row: &SqliteRow) -> Result<LogRecord> {
    let raw_body: String = row.try_get("request_body")?;
    let request_body: Value =
        serde_json::from_str(&raw_body).map_err(|e| TrackError::json("request_body", e))?;

    Ok(LogRecord {
        id: row.try_get("id")?,
        path: row.try_get("path")?,
        path_pattern: row.try_get("path_pattern")?,
        method: row.try_get("method")?,
        status_code: row.try_get::<i64, _>("status_code")? as u16,
        timestamp: from_millis(row.try_get("timestamp")?),
        client_ip: row.try_get("client_ip")?,
        duration_ms: row.try_get("duration_ms")?,
        user_agent: row.try_get("user_agent")?,
        referer: row.try_get("referer")?,
        query_params: json_object(row, "query_params")?,
        path_params: json_object(row, "path_params")?,
        request_body,
        response_size: row.try_get::<i64, _>("response_size")?.max(0) as u64,
        user_id: row.try_get("user_id")?,
        role: row.try_get("role")?,
        trace_id: row.try_get("trace_id")?,
        client_identifier_hash: row.try_get("client_identifier_hash")?,
        created_at: from_millis(row.try_get("created_at")?),
    })
}
