// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Upstream ERP access: pacing and the checkin client.
//!
//! The ERP is the bottleneck and the only failure surface; every caller
//! (ingestion and forwarder alike) goes through the one shared client so the
//! concurrency and rate budget are global.

pub mod client;
pub mod limiter;

use serde::Serialize;

/// Per-record outcome of an upstream submission. Partial success in a batch
/// is represented, not raised.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl SubmitOutcome {
    pub fn accepted(data: Option<serde_json::Value>) -> Self {
        Self { success: true, data, error: None, status: None }
    }

    pub fn rejected(error: impl Into<String>, status: Option<u16>) -> Self {
        Self { success: false, data: None, error: Some(error.into()), status }
    }
}
