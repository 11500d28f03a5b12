// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable attendance queue: a persistent, ordered store keyed by
//! fingerprint. Accepts records while the ERP is unreachable and survives
//! process restarts.

pub mod store;

use serde::Serialize;

use crate::event::AttendanceEvent;

pub use store::AttendanceQueue;

/// Delivery state of a queued record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    Pending,
    Synced,
    FailedTerminal,
}

impl EntryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::FailedTerminal => "failed_terminal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "synced" => Some(Self::Synced),
            "failed_terminal" => Some(Self::FailedTerminal),
            _ => None,
        }
    }
}

/// A persisted queue entry. Instants are epoch seconds.
#[derive(Debug, Clone, Serialize)]
pub struct QueueEntry {
    pub id: i64,
    pub fingerprint: String,
    pub event: AttendanceEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    pub state: EntryState,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub first_seen_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<i64>,
}

/// Result of an enqueue: the (possibly pre-existing) entry, and whether this
/// call inserted it.
#[derive(Debug, Clone)]
pub struct EnqueueOutcome {
    pub entry: QueueEntry,
    pub created: bool,
}

/// Result of a failure mark.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MarkFailed {
    pub attempts: u32,
    pub terminal: bool,
}

/// Entry counts by state.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct QueueStats {
    pub pending: i64,
    pub synced: i64,
    pub failed_terminal: i64,
    pub total: i64,
}

/// Errors surfaced by the storage layer. Never silently swallowed.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("entry {0} not found")]
    NotFound(i64),
    #[error("entry {id} is {state}, expected {expected}")]
    InvalidState { id: i64, state: String, expected: &'static str },
    #[error("storage task failed: {0}")]
    Task(String),
}
