//! Durable ingestion buffer backed by SQLite.
//!
//! Records are stored as JSON, one row each, and survive process restarts.
//! Every row gets a buffer-assigned id which is the only handle the uplink
//! uses to acknowledge it.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE pending_thermometer_records (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     record_json TEXT NOT NULL UNIQUE
//! );
//! ```
//!
//! `UNIQUE` on the encoded record makes a repeated advertisement a no-op.
//! The file is opened in WAL mode so a collecting process and an uploading
//! process can share it.

use crate::measurement::MeasurementRecord;
use rusqlite::{Connection, ErrorCode, params};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

/// Errors raised by the ingestion buffer.
#[derive(Error, Debug)]
pub enum BufferError {
    /// The database is locked by another connection past the busy timeout
    #[error("buffer unavailable: {0}")]
    Unavailable(#[source] rusqlite::Error),
    #[error("buffer storage error: {0}")]
    Storage(#[source] rusqlite::Error),
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to open buffer at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to create buffer directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("buffer connection poisoned by a panicked writer")]
    Poisoned,
    #[error("buffer task failed: {0}")]
    Task(String),
}

impl BufferError {
    /// Whether retrying later may succeed.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, BufferError::Unavailable(_))
    }
}

impl From<rusqlite::Error> for BufferError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
                BufferError::Unavailable(err)
            }
            _ => BufferError::Storage(err),
        }
    }
}

/// Result of [`IngestionBuffer::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Stored under the given id
    Inserted(i64),
    /// An identical record is already pending
    Duplicate,
}

/// A stored record together with its buffer id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub id: i64,
    pub record: MeasurementRecord,
}

/// Persistent FIFO of measurement records awaiting upload.
///
/// Cheap to clone; clones share one connection.
#[derive(Debug, Clone)]
pub struct IngestionBuffer {
    conn: Arc<Mutex<Connection>>,
}

impl IngestionBuffer {
    /// Open (creating if needed) the buffer file at `path`.
    ///
    /// `busy_timeout` bounds how long a call waits on a lock held by another
    /// process before failing with [`BufferError::Unavailable`].
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, BufferError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let open_error = |source| BufferError::Open {
            path: path.display().to_string(),
            source,
        };
        let conn = Connection::open(path).map_err(open_error)?;
        conn.busy_timeout(busy_timeout).map_err(open_error)?;
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(open_error)?;
        debug!(path = %path.display(), journal_mode = %mode, "opened ingestion buffer");

        Self::initialize(conn)
    }

    /// In-memory buffer, lost on drop.
    pub fn open_in_memory() -> Result<Self, BufferError> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> Result<Self, BufferError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS pending_thermometer_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                record_json TEXT NOT NULL UNIQUE
            )",
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, BufferError> {
        self.conn.lock().map_err(|_| BufferError::Poisoned)
    }

    /// Append one record. An identical pending record makes this a no-op.
    pub fn enqueue(&self, record: &MeasurementRecord) -> Result<Enqueued, BufferError> {
        let json = record.to_json()?;
        let conn = self.lock()?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO pending_thermometer_records (record_json) VALUES (?1)",
            params![json],
        )?;
        Ok(match changed {
            0 => Enqueued::Duplicate,
            _ => Enqueued::Inserted(conn.last_insert_rowid()),
        })
    }

    /// Up to `limit` of the oldest pending entries, in id order.
    ///
    /// Entries stay pending until [`delete`](Self::delete)d. Rows that no
    /// longer decode are logged and removed so they cannot block the queue.
    pub fn drain_batch(&self, limit: usize) -> Result<Vec<PendingEntry>, BufferError> {
        let conn = self.lock()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = {
            let mut stmt = conn.prepare(
                "SELECT id, record_json FROM pending_thermometer_records ORDER BY id LIMIT ?1",
            )?;
            stmt.query_map(params![limit], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?
        };

        let mut entries = Vec::with_capacity(rows.len());
        for (id, json) in rows {
            match MeasurementRecord::from_json(&json) {
                Ok(record) => entries.push(PendingEntry { id, record }),
                Err(err) => {
                    error!(id, %err, json = %json, "dropping undecodable buffered record");
                    conn.execute(
                        "DELETE FROM pending_thermometer_records WHERE id = ?1",
                        params![id],
                    )?;
                }
            }
        }
        Ok(entries)
    }

    /// Remove entries by id, returning how many existed. Unknown ids are ignored.
    pub fn delete(&self, ids: &[i64]) -> Result<usize, BufferError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM pending_thermometer_records WHERE id = ?1")?;
            for id in ids {
                removed += stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    /// Number of pending entries.
    pub fn depth(&self) -> Result<u64, BufferError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pending_thermometer_records",
            [],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    /// Run `op` on the blocking thread pool so SQLite I/O and lock waits stay
    /// off the async workers.
    pub async fn run_blocking<T, F>(&self, op: F) -> Result<T, BufferError>
    where
        F: FnOnce(&IngestionBuffer) -> Result<T, BufferError> + Send + 'static,
        T: Send + 'static,
    {
        let buffer = self.clone();
        tokio::task::spawn_blocking(move || op(&buffer))
            .await
            .map_err(|err| BufferError::Task(err.to_string()))?
    }
}
