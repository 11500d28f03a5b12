// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite-backed queue store.
//!
//! A single connection behind a mutex gives single-writer discipline; all
//! calls hop to the blocking pool. Per-fingerprint serialisation falls out of
//! the unique index: the first insert wins, later ones see the existing row.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, OptionalExtension};
use tokio::task;

use crate::event::AttendanceEvent;
use crate::state::epoch_secs;

use super::{EnqueueOutcome, EntryState, MarkFailed, QueueEntry, QueueStats, StorageError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS attendance_queue (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    fingerprint     TEXT NOT NULL UNIQUE,
    payload         TEXT NOT NULL,
    batch_id        TEXT,
    state           TEXT NOT NULL DEFAULT 'pending',
    attempts        INTEGER NOT NULL DEFAULT 0,
    last_error      TEXT,
    first_seen_at   INTEGER NOT NULL,
    last_attempt_at INTEGER,
    synced_at       INTEGER
);
CREATE INDEX IF NOT EXISTS idx_queue_pending
    ON attendance_queue (first_seen_at) WHERE state = 'pending';
CREATE INDEX IF NOT EXISTS idx_queue_batch
    ON attendance_queue (batch_id) WHERE batch_id IS NOT NULL;
";

const ENTRY_COLUMNS: &str =
    "id, fingerprint, payload, batch_id, state, attempts, last_error, \
     first_seen_at, last_attempt_at, synced_at";

/// Durable queue of attendance events awaiting upstream delivery.
pub struct AttendanceQueue {
    db: Arc<Mutex<Connection>>,
}

impl AttendanceQueue {
    /// Open (or create) the queue database at `path`.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::Task(format!("create state dir: {e}")))?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { db: Arc::new(Mutex::new(conn)) })
    }

    /// Open an in-memory queue (tests).
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { db: Arc::new(Mutex::new(conn)) })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        match task::spawn_blocking(move || {
            let conn = db.lock().unwrap_or_else(|e| e.into_inner());
            f(&conn)
        })
        .await
        {
            Ok(result) => result,
            Err(e) => Err(StorageError::Task(e.to_string())),
        }
    }

    /// Look up an entry by fingerprint.
    pub async fn lookup(&self, fingerprint: &str) -> Result<Option<QueueEntry>, StorageError> {
        let fp = fingerprint.to_owned();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {ENTRY_COLUMNS} FROM attendance_queue WHERE fingerprint = ?1");
            let entry = conn.query_row(&sql, [&fp], map_entry).optional()?;
            Ok(entry)
        })
        .await
    }

    /// Insert a pending entry, or return the existing one for this
    /// fingerprint. Idempotent: the first enqueue wins.
    pub async fn enqueue(
        &self,
        event: &AttendanceEvent,
        fingerprint: &str,
        batch_id: Option<&str>,
    ) -> Result<EnqueueOutcome, StorageError> {
        let payload = serde_json::to_string(event)
            .map_err(|e| StorageError::Task(format!("encode payload: {e}")))?;
        let fp = fingerprint.to_owned();
        let batch = batch_id.map(str::to_owned);
        self.with_conn(move |conn| {
            let now = epoch_secs();
            let inserted = conn.execute(
                "INSERT INTO attendance_queue (fingerprint, payload, batch_id, state, attempts, first_seen_at) \
                 VALUES (?1, ?2, ?3, 'pending', 0, ?4) \
                 ON CONFLICT(fingerprint) DO NOTHING",
                rusqlite::params![fp, payload, batch, now],
            )?;
            let sql = format!("SELECT {ENTRY_COLUMNS} FROM attendance_queue WHERE fingerprint = ?1");
            let entry = conn.query_row(&sql, [&fp], map_entry)?;
            Ok(EnqueueOutcome { entry, created: inserted == 1 })
        })
        .await
    }

    /// Claim up to `limit` pending entries with remaining attempt budget,
    /// oldest first.
    pub async fn claim(
        &self,
        limit: usize,
        max_attempts: u32,
    ) -> Result<Vec<QueueEntry>, StorageError> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {ENTRY_COLUMNS} FROM attendance_queue \
                 WHERE state = 'pending' AND attempts < ?1 \
                 ORDER BY first_seen_at ASC, id ASC LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                rusqlite::params![max_attempts, limit as i64],
                map_entry,
            )?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    /// Claim exactly the listed ids, ignoring the attempt cap. Entries that
    /// are already synced (or unknown) are skipped.
    pub async fn claim_ids(&self, ids: &[i64]) -> Result<Vec<QueueEntry>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = ids.to_vec();
        self.with_conn(move |conn| {
            let placeholders = vec!["?"; ids.len()].join(", ");
            let sql = format!(
                "SELECT {ENTRY_COLUMNS} FROM attendance_queue \
                 WHERE id IN ({placeholders}) AND state != 'synced' \
                 ORDER BY first_seen_at ASC, id ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(ids.iter()), map_entry)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    /// Transition `pending -> synced`. A repeat call on an already-synced
    /// entry is a no-op; any other source state is rejected.
    pub async fn mark_synced(&self, id: i64) -> Result<(), StorageError> {
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE attendance_queue SET state = 'synced', synced_at = ?1 \
                 WHERE id = ?2 AND state = 'pending'",
                rusqlite::params![epoch_secs(), id],
            )?;
            if updated == 1 {
                return Ok(());
            }
            match entry_state(conn, id)? {
                None => Err(StorageError::NotFound(id)),
                Some(state) if state == "synced" => Ok(()),
                Some(state) => Err(StorageError::InvalidState { id, state, expected: "pending" }),
            }
        })
        .await
    }

    /// Record a failed delivery attempt. Promotes to `failed_terminal` once
    /// `attempts` reaches `max_attempts`.
    pub async fn mark_failed(
        &self,
        id: i64,
        error: &str,
        max_attempts: u32,
    ) -> Result<MarkFailed, StorageError> {
        let error = error.to_owned();
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE attendance_queue SET \
                     attempts = attempts + 1, \
                     last_error = ?1, \
                     last_attempt_at = ?2, \
                     state = CASE WHEN attempts + 1 >= ?3 THEN 'failed_terminal' ELSE state END \
                 WHERE id = ?4 AND state = 'pending'",
                rusqlite::params![error, epoch_secs(), max_attempts, id],
            )?;
            if updated == 0 {
                return match entry_state(conn, id)? {
                    None => Err(StorageError::NotFound(id)),
                    Some(state) => {
                        Err(StorageError::InvalidState { id, state, expected: "pending" })
                    }
                };
            }
            let (attempts, state): (u32, String) = conn.query_row(
                "SELECT attempts, state FROM attendance_queue WHERE id = ?1",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok(MarkFailed { attempts, terminal: state == "failed_terminal" })
        })
        .await
    }

    /// Move all terminally failed entries back to `pending` with a fresh
    /// attempt budget. Returns how many were reset.
    pub async fn reset_terminal(&self) -> Result<usize, StorageError> {
        self.with_conn(|conn| {
            let count = conn.execute(
                "UPDATE attendance_queue SET state = 'pending', attempts = 0, last_error = NULL \
                 WHERE state = 'failed_terminal'",
                [],
            )?;
            Ok(count)
        })
        .await
    }

    /// Delete synced entries older than the cutoff (epoch seconds). Returns
    /// how many were pruned.
    pub async fn prune(&self, older_than: i64) -> Result<usize, StorageError> {
        self.with_conn(move |conn| {
            let count = conn.execute(
                "DELETE FROM attendance_queue WHERE state = 'synced' AND synced_at < ?1",
                [older_than],
            )?;
            Ok(count)
        })
        .await
    }

    /// Entry counts by state.
    pub async fn stats(&self) -> Result<QueueStats, StorageError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT state, COUNT(*) FROM attendance_queue GROUP BY state")?;
            let mut stats = QueueStats::default();
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (state, count) = row?;
                match state.as_str() {
                    "pending" => stats.pending = count,
                    "synced" => stats.synced = count,
                    "failed_terminal" => stats.failed_terminal = count,
                    _ => {}
                }
                stats.total += count;
            }
            Ok(stats)
        })
        .await
    }

    /// All entries enqueued under a batch tag, oldest first.
    pub async fn batch_entries(&self, batch_id: &str) -> Result<Vec<QueueEntry>, StorageError> {
        let batch = batch_id.to_owned();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {ENTRY_COLUMNS} FROM attendance_queue \
                 WHERE batch_id = ?1 ORDER BY first_seen_at ASC, id ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([&batch], map_entry)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    /// Oldest pending entries, for the operator pending view.
    pub async fn pending_page(&self, limit: usize) -> Result<Vec<QueueEntry>, StorageError> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {ENTRY_COLUMNS} FROM attendance_queue \
                 WHERE state = 'pending' ORDER BY first_seen_at ASC, id ASC LIMIT ?1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([limit as i64], map_entry)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }
}

fn entry_state(conn: &Connection, id: i64) -> Result<Option<String>, StorageError> {
    let state = conn
        .query_row("SELECT state FROM attendance_queue WHERE id = ?1", [id], |row| row.get(0))
        .optional()?;
    Ok(state)
}

fn map_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueueEntry> {
    let payload: String = row.get(2)?;
    let event: AttendanceEvent = serde_json::from_str(&payload).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let state_str: String = row.get(4)?;
    let state = EntryState::parse(&state_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown state {state_str}").into(),
        )
    })?;
    Ok(QueueEntry {
        id: row.get(0)?,
        fingerprint: row.get(1)?,
        event,
        batch_id: row.get(3)?,
        state,
        attempts: row.get(5)?,
        last_error: row.get(6)?,
        first_seen_at: row.get(7)?,
        last_attempt_at: row.get(8)?,
        synced_at: row.get(9)?,
    })
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
