// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end pipeline tests against an in-process mock ERP.
//!
//! The mock binds an ephemeral port and records every checkin call, so the
//! tests can assert both queue state and how often the upstream was hit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Json;
use axum_test::TestServer;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use clockgate::config::GatewayConfig;
use clockgate::forwarder::Forwarder;
use clockgate::queue::AttendanceQueue;
use clockgate::session::authority::SessionAuthority;
use clockgate::session::token::TokenKeys;
use clockgate::state::AppState;
use clockgate::transport::build_router;
use clockgate::upstream::client::ErpClient;

const DEVICE_KEY: &str = "test-device-key";

// -- Mock ERP -----------------------------------------------------------------

struct MockErp {
    /// Employee ids of every checkin call received.
    calls: Mutex<Vec<String>>,
    /// Status returned unless overridden per employee.
    default_status: AtomicU16,
    overrides: Mutex<HashMap<String, u16>>,
}

impl MockErp {
    fn new(default_status: u16) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            default_status: AtomicU16::new(default_status),
            overrides: Mutex::new(HashMap::new()),
        })
    }

    fn set_status(&self, status: u16) {
        self.default_status.store(status, Ordering::SeqCst);
    }

    async fn set_override(&self, employee: &str, status: u16) {
        self.overrides.lock().await.insert(employee.to_owned(), status);
    }

    async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

async fn checkin(
    State(mock): State<Arc<MockErp>>,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    let employee = body["employee"].as_str().unwrap_or_default().to_owned();
    mock.calls.lock().await.push(employee.clone());

    let status = mock
        .overrides
        .lock()
        .await
        .get(&employee)
        .copied()
        .unwrap_or_else(|| mock.default_status.load(Ordering::SeqCst));

    match axum::http::StatusCode::from_u16(status) {
        Ok(code) if code.is_success() => {
            (code, Json(serde_json::json!({ "data": body }))).into_response()
        }
        Ok(code) => (code, Json(serde_json::json!({ "error": "rejected" }))).into_response(),
        Err(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// Serve the mock ERP on an ephemeral port; returns its base URL.
async fn spawn_mock_erp(mock: Arc<MockErp>) -> String {
    let router = axum::Router::new()
        .route("/api/resource/{resource}", post(checkin))
        .with_state(mock);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind mock erp");
    let addr = listener.local_addr().expect("mock erp addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{addr}")
}

// -- Gateway under test -------------------------------------------------------

fn test_config(erp_url: &str) -> GatewayConfig {
    GatewayConfig {
        host: "127.0.0.1".into(),
        port: 0,
        db_path: None,
        state_dir: None,
        erp_url: erp_url.into(),
        erp_api_key: "key".into(),
        erp_api_secret: "secret".into(),
        device_key: DEVICE_KEY.into(),
        token_secret: "test-signing-secret".into(),
        token_secret_previous: None,
        key_grace_days: 0,
        access_ttl_mins: 15,
        refresh_ttl_days: 7,
        max_concurrent_sessions: 5,
        sync_interval_secs: 3600,
        sync_batch_size: 20,
        max_attempts: 3,
        retention_days: 30,
        max_concurrent: 3,
        reservoir: 1000,
        reservoir_refresh: 1000,
        reservoir_window_secs: 60,
        min_spacing_ms: 0,
        upstream_timeout_secs: 2,
        retry_count: 1,
        retry_base_delay_ms: 10,
        upstream_batch_size: 10,
        batch_delay_ms: 0,
    }
}

struct Gateway {
    server: TestServer,
    state: Arc<AppState>,
}

fn gateway(config: GatewayConfig, queue: Arc<AttendanceQueue>) -> Gateway {
    let upstream = Arc::new(ErpClient::from_config(&config));
    let forwarder = Arc::new(Forwarder::new(Arc::clone(&queue), Arc::clone(&upstream), &config));
    let sessions = Arc::new(SessionAuthority::new(
        TokenKeys::new(&config.token_secret, None, Duration::ZERO),
        config.access_ttl(),
        config.refresh_ttl(),
        config.max_concurrent_sessions,
        None,
    ));
    let state = Arc::new(AppState {
        config,
        queue,
        upstream,
        forwarder,
        sessions,
        shutdown: CancellationToken::new(),
    });
    let server =
        TestServer::new(build_router(Arc::clone(&state))).expect("failed to create test server");
    Gateway { server, state }
}

async fn gateway_for(erp_url: &str) -> Gateway {
    let queue = Arc::new(AttendanceQueue::open_in_memory().expect("open queue"));
    gateway(test_config(erp_url), queue)
}

async fn login(server: &TestServer) -> String {
    let resp = server
        .post("/auth/login")
        .json(&serde_json::json!({ "device_id": "D1", "device_key": DEVICE_KEY }))
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    body["data"]["access"].as_str().expect("access token").to_owned()
}

fn event(employee: &str) -> serde_json::Value {
    serde_json::json!({
        "employee_id": employee,
        "timestamp": "2024-06-10T08:30:00Z",
        "kind": "clock-in",
        "device_id": "D1",
    })
}

// -- Scenarios ----------------------------------------------------------------

#[tokio::test]
async fn single_happy_path_syncs_immediately() {
    let mock = MockErp::new(200);
    let erp_url = spawn_mock_erp(Arc::clone(&mock)).await;
    let gw = gateway_for(&erp_url).await;
    let token = login(&gw.server).await;

    let resp = gw
        .server
        .post("/attendance/clock")
        .add_header("authorization", format!("Bearer {token}"))
        .json(&event("E1"))
        .await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert_eq!(body["data"]["synced"], true);
    let record_id = body["data"]["record_id"].as_str().expect("record id").to_owned();
    assert_eq!(record_id.len(), 64);

    let stats = gw.state.queue.stats().await.expect("stats");
    assert_eq!(stats.synced, 1);
    assert_eq!(stats.total, 1);
    assert_eq!(mock.calls().await.len(), 1);
}

#[tokio::test]
async fn offline_then_recover_drains_through_forwarder() {
    let mock = MockErp::new(503);
    let erp_url = spawn_mock_erp(Arc::clone(&mock)).await;
    let gw = gateway_for(&erp_url).await;
    let token = login(&gw.server).await;

    let resp = gw
        .server
        .post("/attendance/clock")
        .add_header("authorization", format!("Bearer {token}"))
        .json(&event("E1"))
        .await;
    let body: serde_json::Value = resp.json();
    assert_eq!(body["data"]["queued"], true);

    let stats = gw.state.queue.stats().await.expect("stats");
    assert_eq!(stats.pending, 1);

    // Upstream recovers; a drain cycle delivers the queued record.
    mock.set_status(200);
    let resp = gw
        .server
        .post("/sync/trigger")
        .add_header("authorization", format!("Bearer {token}"))
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["data"]["claimed"], 1);
    assert_eq!(body["data"]["synced"], 1);

    let stats = gw.state.queue.stats().await.expect("stats");
    assert_eq!(stats.synced, 1);
    assert_eq!(stats.pending, 0);
}

#[tokio::test]
async fn replay_makes_exactly_one_upstream_call() {
    let mock = MockErp::new(200);
    let erp_url = spawn_mock_erp(Arc::clone(&mock)).await;
    let gw = gateway_for(&erp_url).await;
    let token = login(&gw.server).await;

    for expect_duplicate in [false, true] {
        let resp = gw
            .server
            .post("/attendance/clock")
            .add_header("authorization", format!("Bearer {token}"))
            .json(&event("E1"))
            .await;
        let body: serde_json::Value = resp.json();
        assert_eq!(body["data"]["duplicate"], expect_duplicate);
    }

    assert_eq!(mock.calls().await.len(), 1);
    let stats = gw.state.queue.stats().await.expect("stats");
    assert_eq!(stats.total, 1);
}

#[tokio::test]
async fn batch_with_partial_upstream_failure() {
    let mock = MockErp::new(200);
    mock.set_override("E2", 500).await;
    let erp_url = spawn_mock_erp(Arc::clone(&mock)).await;
    let gw = gateway_for(&erp_url).await;
    let token = login(&gw.server).await;

    let resp = gw
        .server
        .post("/attendance/batch")
        .add_header("authorization", format!("Bearer {token}"))
        .json(&serde_json::json!({ "records": [event("E1"), event("E2"), event("E3")] }))
        .await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert_eq!(body["data"]["synced"], 2);
    assert_eq!(body["data"]["queued"], 1);
    assert_eq!(body["data"]["errors"], 0);

    let stats = gw.state.queue.stats().await.expect("stats");
    assert_eq!(stats.synced, 2);
    assert_eq!(stats.pending, 1);
}

#[tokio::test]
async fn persistent_rejection_parks_entry_after_max_attempts() {
    let mock = MockErp::new(400); // terminal rejection, no per-call retries
    let erp_url = spawn_mock_erp(Arc::clone(&mock)).await;
    let gw = gateway_for(&erp_url).await;
    let token = login(&gw.server).await;

    // Enqueue without a synchronous attempt.
    let resp = gw
        .server
        .post("/attendance/batch")
        .add_header("authorization", format!("Bearer {token}"))
        .json(&serde_json::json!({ "records": [event("E1")], "offline_sync": true }))
        .await;
    resp.assert_status_ok();

    // max_attempts = 3 drain cycles move it to failed_terminal.
    for expected_attempts in 1..=3 {
        let resp = gw
            .server
            .post("/sync/trigger")
            .add_header("authorization", format!("Bearer {token}"))
            .await;
        resp.assert_status_ok();
        let body: serde_json::Value = resp.json();
        if expected_attempts < 3 {
            assert_eq!(body["data"]["failed"], 1, "cycle {expected_attempts}");
        }
    }

    let stats = gw.state.queue.stats().await.expect("stats");
    assert_eq!(stats.failed_terminal, 1);
    assert_eq!(stats.pending, 0);

    // A fourth cycle claims nothing.
    let resp = gw
        .server
        .post("/sync/trigger")
        .add_header("authorization", format!("Bearer {token}"))
        .await;
    let body: serde_json::Value = resp.json();
    assert_eq!(body["data"]["claimed"], 0);

    // Operator retry resets the entry and it flows once the ERP accepts.
    mock.set_status(200);
    let resp = gw
        .server
        .post("/sync/retry")
        .add_header("authorization", format!("Bearer {token}"))
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["data"]["reset"], 1);
    assert_eq!(body["data"]["cycle"]["synced"], 1);

    let stats = gw.state.queue.stats().await.expect("stats");
    assert_eq!(stats.synced, 1);
    assert_eq!(stats.failed_terminal, 0);
}

#[tokio::test]
async fn force_sync_ignores_attempt_cap() {
    let mock = MockErp::new(400);
    let erp_url = spawn_mock_erp(Arc::clone(&mock)).await;
    let gw = gateway_for(&erp_url).await;
    let token = login(&gw.server).await;

    let resp = gw
        .server
        .post("/attendance/batch")
        .add_header("authorization", format!("Bearer {token}"))
        .json(&serde_json::json!({ "records": [event("E1")], "offline_sync": true }))
        .await;
    resp.assert_status_ok();

    for _ in 0..3 {
        let _ = gw
            .server
            .post("/sync/trigger")
            .add_header("authorization", format!("Bearer {token}"))
            .await;
    }
    let stats = gw.state.queue.stats().await.expect("stats");
    assert_eq!(stats.failed_terminal, 1);

    // The exhausted entry can still be pushed through by id.
    mock.set_status(200);
    let entries = gw.state.queue.claim_ids(&[1]).await.expect("claim ids");
    assert_eq!(entries.len(), 1);

    let resp = gw
        .server
        .post("/sync/force")
        .add_header("authorization", format!("Bearer {token}"))
        .json(&serde_json::json!({ "ids": [entries[0].id] }))
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["data"]["synced"], 1);
}

#[tokio::test]
async fn forwarder_preserves_arrival_order() {
    let mock = MockErp::new(503);
    let erp_url = spawn_mock_erp(Arc::clone(&mock)).await;
    // Serialise upstream dispatch so delivery order is observable.
    let mut config = test_config(&erp_url);
    config.max_concurrent = 1;
    config.upstream_batch_size = 1;
    let queue = Arc::new(AttendanceQueue::open_in_memory().expect("open queue"));
    let gw = gateway(config, queue);
    let token = login(&gw.server).await;

    for employee in ["E1", "E2", "E3"] {
        let resp = gw
            .server
            .post("/attendance/batch")
            .add_header("authorization", format!("Bearer {token}"))
            .json(&serde_json::json!({ "records": [event(employee)], "offline_sync": true }))
            .await;
        resp.assert_status_ok();
    }

    mock.set_status(200);
    let resp = gw
        .server
        .post("/sync/trigger")
        .add_header("authorization", format!("Bearer {token}"))
        .await;
    resp.assert_status_ok();

    // Claimed oldest-first; delivery order follows claim order.
    let calls = mock.calls().await;
    assert_eq!(calls, vec!["E1", "E2", "E3"]);
}

#[tokio::test]
async fn queue_survives_gateway_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("queue.db");

    let mock = MockErp::new(503);
    let erp_url = spawn_mock_erp(Arc::clone(&mock)).await;

    {
        let queue = Arc::new(AttendanceQueue::open(&db_path).expect("open queue"));
        let gw = gateway(test_config(&erp_url), queue);
        let token = login(&gw.server).await;
        let resp = gw
            .server
            .post("/attendance/clock")
            .add_header("authorization", format!("Bearer {token}"))
            .json(&event("E1"))
            .await;
        let body: serde_json::Value = resp.json();
        assert_eq!(body["data"]["queued"], true);
    }

    // "Restart": a fresh gateway over the same database file.
    mock.set_status(200);
    let queue = Arc::new(AttendanceQueue::open(&db_path).expect("reopen queue"));
    let gw = gateway(test_config(&erp_url), queue);
    let token = login(&gw.server).await;

    let resp = gw
        .server
        .post("/sync/trigger")
        .add_header("authorization", format!("Bearer {token}"))
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["data"]["synced"], 1);
}

#[tokio::test]
async fn background_forwarder_drains_on_its_timer() {
    let mock = MockErp::new(200);
    let erp_url = spawn_mock_erp(Arc::clone(&mock)).await;
    let mut config = test_config(&erp_url);
    config.sync_interval_secs = 1;
    let queue = Arc::new(AttendanceQueue::open_in_memory().expect("open queue"));
    let gw = gateway(config, queue);
    let token = login(&gw.server).await;

    // Queue a record while "offline", then let the background loop find it.
    let resp = gw
        .server
        .post("/attendance/batch")
        .add_header("authorization", format!("Bearer {token}"))
        .json(&serde_json::json!({ "records": [event("E1")], "offline_sync": true }))
        .await;
    resp.assert_status_ok();

    let mut cycles = gw.state.forwarder.subscribe();
    clockgate::forwarder::spawn_forwarder(
        Arc::clone(&gw.state.forwarder),
        gw.state.shutdown.clone(),
    );

    // The immediate start-up drain delivers the record.
    let summary = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match cycles.recv().await {
                Ok(summary) if summary.synced > 0 => return summary,
                Ok(_) => continue,
                Err(_) => panic!("cycle channel closed"),
            }
        }
    })
    .await
    .expect("drain cycle within deadline");
    assert_eq!(summary.synced, 1);

    let stats = gw.state.queue.stats().await.expect("stats");
    assert_eq!(stats.synced, 1);

    // Shutdown stops the loop at the next quiescent point.
    gw.state.shutdown.cancel();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(gw.state.forwarder.phase().await, clockgate::forwarder::Phase::Stopped);
}

#[tokio::test]
async fn cleanup_prunes_old_synced_entries() {
    let mock = MockErp::new(200);
    let erp_url = spawn_mock_erp(Arc::clone(&mock)).await;
    let queue = Arc::new(AttendanceQueue::open_in_memory().expect("open queue"));
    let mut config = test_config(&erp_url);
    config.retention_days = 0; // everything synced is immediately prunable
    let gw = gateway(config, queue);
    let token = login(&gw.server).await;

    let resp = gw
        .server
        .post("/attendance/clock")
        .add_header("authorization", format!("Bearer {token}"))
        .json(&event("E1"))
        .await;
    let body: serde_json::Value = resp.json();
    assert_eq!(body["data"]["synced"], true);

    // synced_at is "now"; a zero retention makes it eligible once the clock
    // ticks past it.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let resp = gw
        .server
        .post("/sync/cleanup")
        .add_header("authorization", format!("Bearer {token}"))
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["data"]["pruned"], 1);
}
