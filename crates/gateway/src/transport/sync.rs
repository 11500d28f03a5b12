// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Forwarder control handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::error::{ok, ApiError};
use crate::forwarder::SyncSettingsUpdate;
use crate::state::AppState;

use super::http::storage_failure;

#[derive(Debug, Deserialize)]
pub struct ForceSyncRequest {
    pub ids: Vec<i64>,
}

/// `POST /sync/trigger` — run one drain cycle now.
pub async fn trigger(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    match s.forwarder.drain().await {
        Ok(summary) => ok(summary).into_response(),
        Err(e) => storage_failure(e).into_response(),
    }
}

/// `POST /sync/retry` — reset terminal failures, then drain.
pub async fn retry(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    match s.forwarder.retry_failed().await {
        Ok((reset, summary)) => {
            ok(serde_json::json!({ "reset": reset, "cycle": summary })).into_response()
        }
        Err(e) => storage_failure(e).into_response(),
    }
}

/// `POST /sync/force` — deliver the listed entry ids, ignoring the attempt cap.
pub async fn force(
    State(s): State<Arc<AppState>>,
    Json(req): Json<ForceSyncRequest>,
) -> impl IntoResponse {
    if req.ids.is_empty() {
        return ApiError::ValidationFailure.to_http_response("ids must not be empty").into_response();
    }
    match s.forwarder.force_sync(&req.ids).await {
        Ok(summary) => ok(summary).into_response(),
        Err(e) => storage_failure(e).into_response(),
    }
}

/// `POST /sync/cleanup` — prune synced entries past retention.
pub async fn cleanup(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    match s.forwarder.prune_synced().await {
        Ok(pruned) => ok(serde_json::json!({ "pruned": pruned })).into_response(),
        Err(e) => storage_failure(e).into_response(),
    }
}

/// `PUT /sync/config` — adjust sync settings; the timer is rescheduled.
pub async fn update_config(
    State(s): State<Arc<AppState>>,
    Json(update): Json<SyncSettingsUpdate>,
) -> impl IntoResponse {
    let applied = s.forwarder.update(update).await;
    ok(applied).into_response()
}

/// `GET /sync/status` — forwarder phase, settings, last cycle, queue stats.
pub async fn status(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = match s.queue.stats().await {
        Ok(stats) => stats,
        Err(e) => return storage_failure(e).into_response(),
    };
    ok(serde_json::json!({
        "phase": s.forwarder.phase().await,
        "settings": s.forwarder.settings().await,
        "last_cycle": s.forwarder.last_cycle().await,
        "queue": stats,
    }))
    .into_response()
}

/// `GET /sync/batch/{batch_id}` — entries enqueued under a batch tag.
pub async fn batch_status(
    State(s): State<Arc<AppState>>,
    Path(batch_id): Path<String>,
) -> impl IntoResponse {
    match s.queue.batch_entries(&batch_id).await {
        Ok(entries) if entries.is_empty() => {
            ApiError::NotFound.to_http_response("unknown batch").into_response()
        }
        Ok(entries) => {
            let synced = entries.iter().filter(|e| e.state == crate::queue::EntryState::Synced).count();
            let pending = entries.iter().filter(|e| e.state == crate::queue::EntryState::Pending).count();
            let failed = entries.len() - synced - pending;
            ok(serde_json::json!({
                "batch_id": batch_id,
                "total": entries.len(),
                "synced": synced,
                "pending": pending,
                "failed_terminal": failed,
                "records": entries,
            }))
            .into_response()
        }
        Err(e) => storage_failure(e).into_response(),
    }
}
