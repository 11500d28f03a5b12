// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;
use crate::session::{AuthError, TokenKind};
use crate::state::AppState;

/// Constant-time string comparison to prevent timing side-channel attacks.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Extract a Bearer token from HTTP headers.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::Malformed)?;
    header.strip_prefix("Bearer ").ok_or(AuthError::Malformed)
}

/// Axum middleware enforcing access-token authentication.
///
/// Exempt: `/health` and the `/auth/*` endpoints, which validate their own
/// credentials (login takes the device key, refresh takes the refresh token).
pub async fn auth_layer(
    State(state): State<Arc<AppState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if path == "/health" || path.starts_with("/auth/") {
        return next.run(req).await;
    }

    let token = match bearer_token(req.headers()) {
        Ok(t) => t.to_owned(),
        Err(_) => {
            return ApiError::AuthFailure.to_http_response("missing bearer token").into_response();
        }
    };

    if let Err(e) = state.sessions.validate(&token, TokenKind::Access).await {
        return ApiError::AuthFailure.to_http_response(e.reason()).into_response();
    }

    next.run(req).await
}
