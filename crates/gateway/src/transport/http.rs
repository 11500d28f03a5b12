// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Attendance ingestion handlers.
//!
//! The ingestion path is best-effort synchronous: an event is never rejected
//! because the upstream is down (it is queued and acknowledged), but it is
//! rejected if the local queue cannot persist it.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{ok, ApiError};
use crate::event::AttendanceEvent;
use crate::fingerprint::fingerprint;
use crate::queue::{EntryState, StorageError};
use crate::state::AppState;

/// Max records per batch submission.
const MAX_BATCH_RECORDS: usize = 200;

/// Number of pending records included in the pending view.
const PENDING_PAGE_SIZE: usize = 50;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ClockOutcome {
    pub record_id: String,
    pub synced: bool,
    pub queued: bool,
    pub duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub records: Vec<AttendanceEvent>,
    #[serde(default)]
    pub batch_id: Option<String>,
    /// Skip the synchronous upstream attempt and leave everything pending.
    #[serde(default)]
    pub offline_sync: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordDisposition {
    Synced,
    Queued,
    Duplicate,
    Error,
}

#[derive(Debug, Serialize)]
pub struct BatchRecordOutcome {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    pub outcome: RecordDisposition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub total: usize,
    pub synced: usize,
    pub queued: usize,
    pub duplicates: usize,
    pub errors: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    pub records: Vec<BatchRecordOutcome>,
}

// -- Handlers -----------------------------------------------------------------

/// `GET /health`
pub async fn health(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    match s.queue.stats().await {
        Ok(stats) => ok(serde_json::json!({ "status": "running", "queue": stats }))
            .into_response(),
        Err(e) => storage_failure(e).into_response(),
    }
}

/// `POST /attendance/clock` — single submission.
pub async fn clock(
    State(s): State<Arc<AppState>>,
    Json(event): Json<AttendanceEvent>,
) -> impl IntoResponse {
    if let Err(detail) = event.validate() {
        return ApiError::ValidationFailure.to_http_response(detail).into_response();
    }

    let fp = fingerprint(&event);
    let existing = match s.queue.lookup(&fp).await {
        Ok(found) => found,
        Err(e) => return storage_failure(e).into_response(),
    };

    if let Some(entry) = existing {
        let synced = entry.state == EntryState::Synced;
        tracing::debug!(fingerprint = %fp, state = entry.state.as_str(), "duplicate submission");
        return ok(ClockOutcome {
            record_id: fp,
            synced,
            queued: !synced,
            duplicate: true,
            error: None,
        })
        .into_response();
    }

    let enqueued = match s.queue.enqueue(&event, &fp, None).await {
        Ok(outcome) => outcome,
        Err(e) => return storage_failure(e).into_response(),
    };
    if !enqueued.created {
        // Lost the insert race to a concurrent submission of the same event;
        // that handler owns the synchronous attempt.
        let synced = enqueued.entry.state == EntryState::Synced;
        return ok(ClockOutcome {
            record_id: fp,
            synced,
            queued: !synced,
            duplicate: true,
            error: None,
        })
        .into_response();
    }
    let entry_id = enqueued.entry.id;

    // Best-effort synchronous delivery; the entry is already safe on disk.
    let outcome = s.upstream.submit_one(&event).await;
    if outcome.success {
        if let Err(e) = s.queue.mark_synced(entry_id).await {
            // The ERP accepted the record; the fingerprint guard keeps the
            // dedup invariant even though the entry is still pending here.
            tracing::error!(entry_id, err = %e, "failed to mark entry synced");
        }
        ok(ClockOutcome { record_id: fp, synced: true, queued: false, duplicate: false, error: None })
            .into_response()
    } else {
        tracing::info!(
            fingerprint = %fp,
            err = outcome.error.as_deref().unwrap_or(""),
            "upstream unavailable, record queued"
        );
        ok(ClockOutcome {
            record_id: fp,
            synced: false,
            queued: true,
            duplicate: false,
            error: outcome.error,
        })
        .into_response()
    }
}

/// `POST /attendance/batch` — 1..200 events, per-record outcomes.
pub async fn batch(
    State(s): State<Arc<AppState>>,
    Json(req): Json<BatchRequest>,
) -> impl IntoResponse {
    if req.records.is_empty() || req.records.len() > MAX_BATCH_RECORDS {
        return ApiError::ValidationFailure
            .to_http_response(format!(
                "batch must contain 1..{MAX_BATCH_RECORDS} records, got {}",
                req.records.len()
            ))
            .into_response();
    }

    let mut records: Vec<BatchRecordOutcome> = Vec::with_capacity(req.records.len());
    // Freshly enqueued entries eligible for a synchronous attempt.
    let mut submitted: Vec<(usize, i64, AttendanceEvent)> = Vec::new();

    for (index, event) in req.records.iter().enumerate() {
        if let Err(detail) = event.validate() {
            records.push(BatchRecordOutcome {
                index,
                record_id: None,
                outcome: RecordDisposition::Error,
                error: Some(detail),
            });
            continue;
        }

        let fp = fingerprint(event);
        match s.queue.lookup(&fp).await {
            Err(e) => {
                records.push(BatchRecordOutcome {
                    index,
                    record_id: Some(fp),
                    outcome: RecordDisposition::Error,
                    error: Some(e.to_string()),
                });
                continue;
            }
            Ok(Some(_)) => {
                records.push(BatchRecordOutcome {
                    index,
                    record_id: Some(fp),
                    outcome: RecordDisposition::Duplicate,
                    error: None,
                });
                continue;
            }
            Ok(None) => {}
        }

        match s.queue.enqueue(event, &fp, req.batch_id.as_deref()).await {
            Err(e) => {
                records.push(BatchRecordOutcome {
                    index,
                    record_id: Some(fp),
                    outcome: RecordDisposition::Error,
                    error: Some(e.to_string()),
                });
            }
            Ok(outcome) if !outcome.created => {
                records.push(BatchRecordOutcome {
                    index,
                    record_id: Some(fp),
                    outcome: RecordDisposition::Duplicate,
                    error: None,
                });
            }
            Ok(outcome) => {
                records.push(BatchRecordOutcome {
                    index,
                    record_id: Some(fp),
                    outcome: RecordDisposition::Queued,
                    error: None,
                });
                if !req.offline_sync {
                    submitted.push((records.len() - 1, outcome.entry.id, event.clone()));
                }
            }
        }
    }

    // One upstream pass for everything new; per-record partial success.
    if !submitted.is_empty() {
        let events: Vec<_> = submitted.iter().map(|(_, _, ev)| ev.clone()).collect();
        let outcomes = s.upstream.submit_many(&events).await;
        for ((record_idx, entry_id, _), outcome) in submitted.iter().zip(outcomes) {
            if outcome.success {
                match s.queue.mark_synced(*entry_id).await {
                    Ok(()) => records[*record_idx].outcome = RecordDisposition::Synced,
                    Err(e) => {
                        tracing::error!(entry_id, err = %e, "failed to mark entry synced");
                        records[*record_idx].outcome = RecordDisposition::Synced;
                    }
                }
            } else {
                records[*record_idx].error = outcome.error;
            }
        }
    }

    let response = BatchResponse {
        total: records.len(),
        synced: records.iter().filter(|r| r.outcome == RecordDisposition::Synced).count(),
        queued: records.iter().filter(|r| r.outcome == RecordDisposition::Queued).count(),
        duplicates: records.iter().filter(|r| r.outcome == RecordDisposition::Duplicate).count(),
        errors: records.iter().filter(|r| r.outcome == RecordDisposition::Error).count(),
        batch_id: req.batch_id,
        records,
    };
    ok(response).into_response()
}

/// `GET /attendance/status/{record_id}` — queue entry by fingerprint.
pub async fn record_status(
    State(s): State<Arc<AppState>>,
    Path(record_id): Path<String>,
) -> impl IntoResponse {
    match s.queue.lookup(&record_id).await {
        Ok(Some(entry)) => ok(entry).into_response(),
        Ok(None) => ApiError::NotFound.to_http_response("record not found").into_response(),
        Err(e) => storage_failure(e).into_response(),
    }
}

/// `GET /attendance/pending` — queue stats plus the oldest pending records.
pub async fn pending(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = match s.queue.stats().await {
        Ok(stats) => stats,
        Err(e) => return storage_failure(e).into_response(),
    };
    match s.queue.pending_page(PENDING_PAGE_SIZE).await {
        Ok(entries) => {
            ok(serde_json::json!({ "stats": stats, "records": entries })).into_response()
        }
        Err(e) => storage_failure(e).into_response(),
    }
}

pub(crate) fn storage_failure(e: StorageError) -> (axum::http::StatusCode, Json<crate::error::Envelope<serde_json::Value>>) {
    tracing::error!(err = %e, "queue storage failure");
    ApiError::StorageFailure.to_http_response(e.to_string())
}
