// # SQLite History Store
//
// Durable implementation of HistoryStore, shared with the dashboard.
//
// ## Durability
//
// - WAL journal with `synchronous=FULL`: every committed write survives a crash
// - Every trait method commits before returning
// - `record_success` writes the history row and the cache row in one
//   transaction, so a crash can never leave one without the other
//
// ## Schema
//
// ```sql
// update_history(id, entry_id NULL, status, ip_address, response_summary, created_at)
// ip_cache(entry_id PRIMARY KEY, last_ip, last_success_at)
// ```
//
// A NULL `entry_id` marks a whole-cycle event (config rejected, IP check failed).
//
// rusqlite is blocking, so every call runs on the blocking pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::Error;
use crate::traits::history_store::{
    CacheEntry, HistoryQuery, HistoryRecord, HistoryStore, NewHistoryRecord, UpdateStatus,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS update_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entry_id TEXT,
    status TEXT NOT NULL CHECK (status IN ('success', 'error', 'skipped')),
    ip_address TEXT,
    response_summary TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_update_history_entry ON update_history (entry_id, id);
CREATE TABLE IF NOT EXISTS ip_cache (
    entry_id TEXT PRIMARY KEY,
    last_ip TEXT NOT NULL,
    last_success_at TEXT NOT NULL
);
"#;

/// SQLite-backed history store
#[derive(Debug, Clone)]
pub struct SqliteHistoryStore {
    path: Option<PathBuf>,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteHistoryStore {
    /// Open (or create) the database at `path`
    ///
    /// Parent directories are created if needed.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    Error::store(format!(
                        "Failed to create store directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let open_path = path.clone();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, Error> {
            let conn = Connection::open(&open_path).map_err(|e| {
                Error::store(format!("Failed to open {}: {}", open_path.display(), e))
            })?;
            initialize(&conn)?;
            Ok(conn)
        })
        .await
        .map_err(|e| Error::store(format!("store task failed: {e}")))??;

        tracing::debug!("Opened history store at {}", path.display());
        Ok(Self {
            path: Some(path),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()?;
        initialize(&conn)?;
        Ok(Self {
            path: None,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Database path, if file backed
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| Error::store("connection mutex poisoned"))?;
            f(&mut *guard).map_err(Error::from)
        })
        .await
        .map_err(|e| Error::store(format!("store task failed: {e}")))?
    }
}

fn initialize(conn: &Connection) -> Result<(), Error> {
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    tracing::trace!("SQLite journal mode: {}", mode);
    conn.pragma_update(None, "synchronous", "FULL")?;
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

fn insert_history(conn: &Connection, record: &NewHistoryRecord) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO update_history (entry_id, status, ip_address, response_summary, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record.entry_id,
            record.status.as_str(),
            record.ip_address.map(|ip| ip.to_string()),
            record.response_summary,
            Utc::now(),
        ],
    )?;
    Ok(())
}

fn conversion_error<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

fn parse_ip(column: usize, raw: &str) -> rusqlite::Result<IpAddr> {
    raw.parse().map_err(|e| conversion_error(column, e))
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn append(&self, record: NewHistoryRecord) -> Result<(), Error> {
        self.with_conn(move |conn| insert_history(conn, &record)).await
    }

    async fn record_success(
        &self,
        entry_id: &str,
        ip: IpAddr,
        response_summary: &str,
    ) -> Result<(), Error> {
        let record =
            NewHistoryRecord::for_entry(entry_id, UpdateStatus::Success, Some(ip), response_summary);
        let entry_id = entry_id.to_string();

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            insert_history(&tx, &record)?;
            tx.execute(
                "INSERT INTO ip_cache (entry_id, last_ip, last_success_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (entry_id) DO UPDATE SET
                     last_ip = excluded.last_ip,
                     last_success_at = excluded.last_success_at",
                params![entry_id, ip.to_string(), Utc::now()],
            )?;
            tx.commit()
        })
        .await
    }

    async fn history(&self, query: HistoryQuery) -> Result<Vec<HistoryRecord>, Error> {
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, entry_id, status, ip_address, response_summary, created_at
                 FROM update_history
                 WHERE (?1 IS NULL OR entry_id = ?1)
                 ORDER BY id DESC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![query.entry_id, limit], |row| {
                let status: String = row.get(2)?;
                let ip: Option<String> = row.get(3)?;
                Ok(HistoryRecord {
                    id: row.get(0)?,
                    entry_id: row.get(1)?,
                    status: status.parse().map_err(|e| conversion_error(2, e))?,
                    ip_address: ip.as_deref().map(|raw| parse_ip(3, raw)).transpose()?,
                    response_summary: row.get(4)?,
                    created_at: row.get::<_, DateTime<Utc>>(5)?,
                })
            })?;
            rows.collect()
        })
        .await
    }

    async fn cache(&self) -> Result<HashMap<String, CacheEntry>, Error> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT entry_id, last_ip, last_success_at FROM ip_cache")?;
            let rows = stmt.query_map([], |row| {
                let entry_id: String = row.get(0)?;
                let last_ip: String = row.get(1)?;
                Ok((
                    entry_id,
                    CacheEntry {
                        last_ip: parse_ip(1, &last_ip)?,
                        last_success_at: row.get(2)?,
                    },
                ))
            })?;
            rows.collect()
        })
        .await
    }

    async fn trim(&self, keep: usize) -> Result<usize, Error> {
        let keep = i64::try_from(keep).unwrap_or(i64::MAX);

        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM update_history
                 WHERE id NOT IN (SELECT id FROM update_history ORDER BY id DESC LIMIT ?1)",
                params![keep],
            )
        })
        .await
    }

    async fn flush(&self) -> Result<(), Error> {
        self.with_conn(|conn| {
            conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
                .optional()
                .map(|_| ())
        })
        .await
    }
}
