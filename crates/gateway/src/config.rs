// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the clockgate gateway.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "clockgate", about = "Attendance edge gateway")]
pub struct GatewayConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "CLOCKGATE_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 9700, env = "CLOCKGATE_PORT")]
    pub port: u16,

    /// Path to the queue database. Defaults to `<state-dir>/queue.db`.
    #[arg(long, env = "CLOCKGATE_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// State directory for the queue database and session snapshot.
    #[arg(long, env = "CLOCKGATE_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Upstream ERP base URL.
    #[arg(long, env = "CLOCKGATE_ERP_URL")]
    pub erp_url: String,

    /// ERP API key (token auth).
    #[arg(long, env = "CLOCKGATE_ERP_API_KEY")]
    pub erp_api_key: String,

    /// ERP API secret (token auth).
    #[arg(long, env = "CLOCKGATE_ERP_API_SECRET")]
    pub erp_api_secret: String,

    /// Shared device key accepted at login.
    #[arg(long, env = "CLOCKGATE_DEVICE_KEY")]
    pub device_key: String,

    /// Token signing secret.
    #[arg(long, env = "CLOCKGATE_TOKEN_SECRET")]
    pub token_secret: String,

    /// Previous token signing secret, accepted during the rotation grace window.
    #[arg(long, env = "CLOCKGATE_TOKEN_SECRET_PREVIOUS")]
    pub token_secret_previous: Option<String>,

    /// Days the previous signing secret remains accepted. 0 disables.
    #[arg(long, default_value_t = 0, env = "CLOCKGATE_KEY_GRACE_DAYS")]
    pub key_grace_days: u64,

    /// Access token lifetime in minutes.
    #[arg(long, default_value_t = 15, env = "CLOCKGATE_ACCESS_TTL_MINS")]
    pub access_ttl_mins: u64,

    /// Refresh token lifetime in days.
    #[arg(long, default_value_t = 7, env = "CLOCKGATE_REFRESH_TTL_DAYS")]
    pub refresh_ttl_days: u64,

    /// Max active sessions per subject.
    #[arg(long, default_value_t = 5, env = "CLOCKGATE_MAX_CONCURRENT_SESSIONS")]
    pub max_concurrent_sessions: usize,

    /// Forwarder cycle period in seconds.
    #[arg(long, default_value_t = 30, env = "CLOCKGATE_SYNC_INTERVAL_SECS")]
    pub sync_interval_secs: u64,

    /// Max entries claimed per forwarder cycle.
    #[arg(long, default_value_t = 20, env = "CLOCKGATE_SYNC_BATCH_SIZE")]
    pub sync_batch_size: usize,

    /// Delivery attempts before an entry is parked as terminally failed.
    #[arg(long, default_value_t = 3, env = "CLOCKGATE_MAX_ATTEMPTS")]
    pub max_attempts: u32,

    /// Age in days at which synced entries become prunable.
    #[arg(long, default_value_t = 30, env = "CLOCKGATE_RETENTION_DAYS")]
    pub retention_days: u64,

    /// Max in-flight upstream requests.
    #[arg(long, default_value_t = 3, env = "CLOCKGATE_MAX_CONCURRENT")]
    pub max_concurrent: usize,

    /// Upstream rate reservoir size.
    #[arg(long, default_value_t = 100, env = "CLOCKGATE_RESERVOIR")]
    pub reservoir: u32,

    /// Tokens added to the reservoir each window.
    #[arg(long, default_value_t = 100, env = "CLOCKGATE_RESERVOIR_REFRESH")]
    pub reservoir_refresh: u32,

    /// Reservoir refill window in seconds.
    #[arg(long, default_value_t = 60, env = "CLOCKGATE_RESERVOIR_WINDOW_SECS")]
    pub reservoir_window_secs: u64,

    /// Minimum gap between upstream calls in milliseconds.
    #[arg(long, default_value_t = 300, env = "CLOCKGATE_MIN_SPACING_MS")]
    pub min_spacing_ms: u64,

    /// Per-call upstream deadline in seconds.
    #[arg(long, default_value_t = 30, env = "CLOCKGATE_UPSTREAM_TIMEOUT_SECS")]
    pub upstream_timeout_secs: u64,

    /// Attempts per upstream call (including the first).
    #[arg(long, default_value_t = 3, env = "CLOCKGATE_RETRY_COUNT")]
    pub retry_count: u32,

    /// Base delay for upstream retry backoff in milliseconds.
    #[arg(long, default_value_t = 1000, env = "CLOCKGATE_RETRY_BASE_DELAY_MS")]
    pub retry_base_delay_ms: u64,

    /// Slice size for upstream batch submission.
    #[arg(long, default_value_t = 10, env = "CLOCKGATE_UPSTREAM_BATCH_SIZE")]
    pub upstream_batch_size: usize,

    /// Delay between upstream batch slices in milliseconds.
    #[arg(long, default_value_t = 1000, env = "CLOCKGATE_BATCH_DELAY_MS")]
    pub batch_delay_ms: u64,
}

impl GatewayConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days * 24 * 3600)
    }

    pub fn reservoir_window(&self) -> Duration {
        Duration::from_secs(self.reservoir_window_secs)
    }

    pub fn min_spacing(&self) -> Duration {
        Duration::from_millis(self.min_spacing_ms)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn access_ttl(&self) -> Duration {
        Duration::from_secs(self.access_ttl_mins * 60)
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_ttl_days * 24 * 3600)
    }

    pub fn key_grace(&self) -> Duration {
        Duration::from_secs(self.key_grace_days * 24 * 3600)
    }

    /// Resolve the state directory for gateway data.
    ///
    /// Checks `--state-dir`, then `$XDG_STATE_HOME/clockgate`, then
    /// `$HOME/.local/state/clockgate`.
    pub fn resolved_state_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.state_dir {
            return dir.clone();
        }
        if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
            return PathBuf::from(xdg).join("clockgate");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local/state/clockgate");
        }
        PathBuf::from(".clockgate")
    }

    pub fn resolved_db_path(&self) -> PathBuf {
        match self.db_path {
            Some(ref p) => p.clone(),
            None => self.resolved_state_dir().join("queue.db"),
        }
    }
}
