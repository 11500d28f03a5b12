// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session authority handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::error::{ok, ApiError};
use crate::session::{TerminationReason, TokenKind};
use crate::state::AppState;

use super::auth::{bearer_token, constant_time_eq};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub device_id: String,
    pub device_key: String,
    /// Subject to bind the session to; defaults to the device id.
    #[serde(default)]
    pub subject_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

fn remote_addr(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .unwrap_or("unknown")
        .trim()
        .to_owned()
}

fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_owned()
}

/// `POST /auth/login` — authenticate a device and issue a session.
pub async fn login(
    State(s): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    if req.device_id.trim().is_empty() {
        return ApiError::ValidationFailure
            .to_http_response("device_id must not be empty")
            .into_response();
    }
    if !constant_time_eq(&req.device_key, &s.config.device_key) {
        tracing::warn!(device_id = %req.device_id, "login rejected: bad device key");
        return ApiError::AuthFailure.to_http_response("invalid device key").into_response();
    }

    let subject = req.subject_id.as_deref().unwrap_or(&req.device_id);
    match s
        .sessions
        .issue(subject, &req.device_id, &remote_addr(&headers), &user_agent(&headers))
        .await
    {
        Ok(tokens) => ok(tokens).into_response(),
        Err(e) => ApiError::AuthFailure.to_http_response(e.reason()).into_response(),
    }
}

/// `POST /auth/refresh` — mint a new access token from a refresh token.
pub async fn refresh(
    State(s): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> impl IntoResponse {
    match s.sessions.refresh(&req.refresh_token).await {
        Ok(refreshed) => ok(refreshed).into_response(),
        Err(e) => ApiError::AuthFailure.to_http_response(e.reason()).into_response(),
    }
}

/// `POST /auth/logout` — terminate the caller's session.
pub async fn logout(State(s): State<Arc<AppState>>, headers: HeaderMap) -> impl IntoResponse {
    let token = match bearer_token(&headers) {
        Ok(t) => t,
        Err(_) => {
            return ApiError::AuthFailure.to_http_response("missing bearer token").into_response()
        }
    };
    let claims = match s.sessions.validate(token, TokenKind::Access).await {
        Ok(c) => c,
        Err(e) => return ApiError::AuthFailure.to_http_response(e.reason()).into_response(),
    };

    s.sessions.terminate(&claims.sid, TerminationReason::Logout).await;
    ok(serde_json::json!({ "terminated": true, "session_id": claims.sid })).into_response()
}

/// `GET /auth/verify` — validate the caller's access token.
pub async fn verify(State(s): State<Arc<AppState>>, headers: HeaderMap) -> impl IntoResponse {
    let token = match bearer_token(&headers) {
        Ok(t) => t,
        Err(_) => {
            return ApiError::AuthFailure.to_http_response("missing bearer token").into_response()
        }
    };
    match s.sessions.validate(token, TokenKind::Access).await {
        Ok(claims) => ok(serde_json::json!({
            "valid": true,
            "subject_id": claims.sub,
            "device_id": claims.device_id,
            "session_id": claims.sid,
            "expires_at": claims.exp,
        }))
        .into_response(),
        Err(e) => ApiError::AuthFailure.to_http_response(e.reason()).into_response(),
    }
}

/// `GET /auth/sessions` — the caller's currently-active sessions.
pub async fn sessions(State(s): State<Arc<AppState>>, headers: HeaderMap) -> impl IntoResponse {
    let token = match bearer_token(&headers) {
        Ok(t) => t,
        Err(_) => {
            return ApiError::AuthFailure.to_http_response("missing bearer token").into_response()
        }
    };
    match s.sessions.validate(token, TokenKind::Access).await {
        Ok(claims) => ok(s.sessions.list(&claims.sub).await).into_response(),
        Err(e) => ApiError::AuthFailure.to_http_response(e.reason()).into_response(),
    }
}
