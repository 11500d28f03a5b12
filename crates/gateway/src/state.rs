// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;
use crate::forwarder::Forwarder;
use crate::queue::AttendanceQueue;
use crate::session::authority::SessionAuthority;
use crate::upstream::client::ErpClient;

/// Shared gateway state. Constructed once at startup and handed to every
/// handler and background task.
pub struct AppState {
    pub config: GatewayConfig,
    pub queue: Arc<AttendanceQueue>,
    pub upstream: Arc<ErpClient>,
    pub forwarder: Arc<Forwarder>,
    pub sessions: Arc<SessionAuthority>,
    pub shutdown: CancellationToken,
}

/// Return current epoch seconds.
pub fn epoch_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
