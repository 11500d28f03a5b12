// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! API error codes and the response envelope.
//!
//! Every HTTP response (success or error) uses the same envelope:
//! `{status, data?, error_code?, message?, timestamp, request_id}`.

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::fmt;

use crate::state::epoch_secs;

/// Error codes for the gateway API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ApiError {
    ValidationFailure,
    AuthFailure,
    NotFound,
    StorageFailure,
    Internal,
}

impl ApiError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ValidationFailure => 400,
            Self::AuthFailure => 401,
            Self::NotFound => 404,
            Self::StorageFailure => 500,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationFailure => "VALIDATION_FAILURE",
            Self::AuthFailure => "AUTH_FAILURE",
            Self::NotFound => "NOT_FOUND",
            Self::StorageFailure => "STORAGE_FAILURE",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<Envelope<serde_json::Value>>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(Envelope::error(self.as_str(), message)))
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response envelope shared by all endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T: Serialize> {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: i64,
    pub request_id: String,
}

impl<T: Serialize> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "success",
            data: Some(data),
            error_code: None,
            message: None,
            timestamp: epoch_secs(),
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self {
            status: "error",
            data: None,
            error_code: Some(code.to_owned()),
            message: Some(message.into()),
            timestamp: epoch_secs(),
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// Shorthand for a 200 success envelope.
pub fn ok<T: Serialize>(data: T) -> (StatusCode, Json<Envelope<T>>) {
    (StatusCode::OK, Json(Envelope::success(data)))
}
