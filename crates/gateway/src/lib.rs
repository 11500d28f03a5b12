// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clockgate: edge gateway between biometric attendance devices and an
//! upstream HR/ERP system. Accepts clock events, deduplicates them, and
//! forwards them upstream exactly once, even across long ERP outages.

pub mod config;
pub mod error;
pub mod event;
pub mod fingerprint;
pub mod forwarder;
pub mod queue;
pub mod session;
pub mod state;
pub mod transport;
pub mod upstream;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;
use crate::forwarder::{spawn_forwarder, Forwarder};
use crate::queue::AttendanceQueue;
use crate::session::authority::{spawn_session_sweeper, SessionAuthority};
use crate::state::AppState;
use crate::transport::build_router;
use crate::upstream::client::ErpClient;

/// Run the gateway until shutdown.
pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let queue = Arc::new(AttendanceQueue::open(&config.resolved_db_path())?);
    let upstream = Arc::new(ErpClient::from_config(&config));
    let forwarder = Arc::new(Forwarder::new(Arc::clone(&queue), Arc::clone(&upstream), &config));
    let sessions = Arc::new(SessionAuthority::from_config(&config));

    // Restore device sessions from the previous run, if any.
    let session_snapshot = config.resolved_state_dir().join("sessions.json");
    if session_snapshot.exists() {
        match session::persist::load(&session_snapshot) {
            Ok(persisted) => sessions.load_persisted(persisted).await,
            Err(e) => tracing::warn!(err = %e, "failed to load persisted sessions"),
        }
    }

    spawn_forwarder(Arc::clone(&forwarder), shutdown.clone());
    spawn_session_sweeper(Arc::clone(&sessions), shutdown.clone());

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                shutdown.cancel();
            }
        });
    }

    let state = Arc::new(AppState {
        config,
        queue,
        upstream,
        forwarder,
        sessions,
        shutdown: shutdown.clone(),
    });

    tracing::info!("clockgate listening on {addr}");
    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}
