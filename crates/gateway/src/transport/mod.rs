// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport for the gateway.

pub mod auth;
pub mod http;
pub mod http_auth;
pub mod sync;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::AppState;

/// Build the axum `Router` with all gateway routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/health", get(http::health))
        // Attendance ingestion
        .route("/attendance/clock", post(http::clock))
        .route("/attendance/batch", post(http::batch))
        .route("/attendance/status/{record_id}", get(http::record_status))
        .route("/attendance/pending", get(http::pending))
        // Forwarder controls
        .route("/sync/trigger", post(sync::trigger))
        .route("/sync/retry", post(sync::retry))
        .route("/sync/force", post(sync::force))
        .route("/sync/cleanup", post(sync::cleanup))
        .route("/sync/config", put(sync::update_config))
        .route("/sync/status", get(sync::status))
        .route("/sync/batch/{batch_id}", get(sync::batch_status))
        // Session authority
        .route("/auth/login", post(http_auth::login))
        .route("/auth/refresh", post(http_auth::refresh))
        .route("/auth/logout", post(http_auth::logout))
        .route("/auth/verify", get(http_auth::verify))
        .route("/auth/sessions", get(http_auth::sessions))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
