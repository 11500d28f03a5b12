// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background forwarder: drains the durable queue into the ERP in bounded
//! batches on a timer, and exposes the manual sync operations.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex, Notify, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;
use crate::queue::{AttendanceQueue, QueueEntry, StorageError};
use crate::state::epoch_secs;
use crate::upstream::client::ErpClient;

/// Forwarder lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Stopped,
    Running,
    Draining,
}

/// Tunable sync settings, adjustable at runtime via `update`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SyncSettings {
    pub sync_interval_secs: u64,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub retention_days: u64,
}

impl SyncSettings {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days * 24 * 3600)
    }
}

/// Partial settings update; absent fields keep their value.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct SyncSettingsUpdate {
    pub sync_interval_secs: Option<u64>,
    pub batch_size: Option<usize>,
    pub max_attempts: Option<u32>,
}

/// Outcome of one drain cycle.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CycleSummary {
    pub claimed: usize,
    pub synced: usize,
    pub failed: usize,
    pub terminal: usize,
    pub duration_ms: u64,
    pub at: i64,
}

/// The background forwarder. One per process; drains never overlap.
pub struct Forwarder {
    queue: Arc<AttendanceQueue>,
    upstream: Arc<ErpClient>,
    settings: RwLock<SyncSettings>,
    phase: RwLock<Phase>,
    drain_lock: Mutex<()>,
    reconfigured: Notify,
    cycle_tx: broadcast::Sender<CycleSummary>,
    last_cycle: RwLock<Option<CycleSummary>>,
}

impl Forwarder {
    pub fn new(
        queue: Arc<AttendanceQueue>,
        upstream: Arc<ErpClient>,
        config: &GatewayConfig,
    ) -> Self {
        let (cycle_tx, _) = broadcast::channel(64);
        Self {
            queue,
            upstream,
            settings: RwLock::new(SyncSettings {
                sync_interval_secs: config.sync_interval_secs,
                batch_size: config.sync_batch_size,
                max_attempts: config.max_attempts,
                retention_days: config.retention_days,
            }),
            phase: RwLock::new(Phase::Stopped),
            drain_lock: Mutex::new(()),
            reconfigured: Notify::new(),
            cycle_tx,
            last_cycle: RwLock::new(None),
        }
    }

    pub async fn phase(&self) -> Phase {
        *self.phase.read().await
    }

    pub async fn settings(&self) -> SyncSettings {
        *self.settings.read().await
    }

    pub async fn last_cycle(&self) -> Option<CycleSummary> {
        *self.last_cycle.read().await
    }

    /// Subscribe to cycle summaries.
    pub fn subscribe(&self) -> broadcast::Receiver<CycleSummary> {
        self.cycle_tx.subscribe()
    }

    /// Run one drain cycle now. Serialised against the background timer.
    pub async fn drain(&self) -> Result<CycleSummary, StorageError> {
        let _guard = self.drain_lock.lock().await;
        let was = *self.phase.read().await;
        if was == Phase::Running {
            *self.phase.write().await = Phase::Draining;
        }

        let settings = *self.settings.read().await;
        let result = async {
            let entries = self.queue.claim(settings.batch_size, settings.max_attempts).await?;
            self.deliver(entries, settings.max_attempts).await
        }
        .await;

        if was == Phase::Running {
            *self.phase.write().await = Phase::Running;
        }

        let summary = result?;
        self.finish_cycle(summary).await;
        Ok(summary)
    }

    /// Reset terminally failed entries, then drain. Returns the reset count
    /// and the cycle summary.
    pub async fn retry_failed(&self) -> Result<(usize, CycleSummary), StorageError> {
        let reset = self.queue.reset_terminal().await?;
        if reset > 0 {
            tracing::info!(reset, "terminal entries reset for retry");
        }
        let summary = self.drain().await?;
        Ok((reset, summary))
    }

    /// Deliver exactly the listed entry ids, ignoring the attempt cap.
    pub async fn force_sync(&self, ids: &[i64]) -> Result<CycleSummary, StorageError> {
        let _guard = self.drain_lock.lock().await;
        let settings = *self.settings.read().await;
        let entries = self.queue.claim_ids(ids).await?;
        let summary = self.deliver(entries, settings.max_attempts).await?;
        self.finish_cycle(summary).await;
        Ok(summary)
    }

    /// Prune synced entries older than the retention period. Returns the
    /// pruned count.
    pub async fn prune_synced(&self) -> Result<usize, StorageError> {
        let settings = *self.settings.read().await;
        let cutoff = epoch_secs() - settings.retention().as_secs() as i64;
        let pruned = self.queue.prune(cutoff).await?;
        if pruned > 0 {
            tracing::info!(pruned, "pruned synced entries past retention");
        }
        Ok(pruned)
    }

    /// Apply a settings update atomically and reschedule the timer.
    pub async fn update(&self, update: SyncSettingsUpdate) -> SyncSettings {
        let mut settings = self.settings.write().await;
        if let Some(interval) = update.sync_interval_secs {
            settings.sync_interval_secs = interval.max(1);
        }
        if let Some(batch) = update.batch_size {
            settings.batch_size = batch.clamp(1, 500);
        }
        if let Some(attempts) = update.max_attempts {
            settings.max_attempts = attempts.max(1);
        }
        let applied = *settings;
        drop(settings);
        self.reconfigured.notify_waiters();
        tracing::info!(
            sync_interval_secs = applied.sync_interval_secs,
            batch_size = applied.batch_size,
            max_attempts = applied.max_attempts,
            "sync settings updated"
        );
        applied
    }

    async fn deliver(
        &self,
        entries: Vec<QueueEntry>,
        max_attempts: u32,
    ) -> Result<CycleSummary, StorageError> {
        let started = Instant::now();
        let mut summary = CycleSummary {
            claimed: entries.len(),
            at: epoch_secs(),
            ..CycleSummary::default()
        };
        if entries.is_empty() {
            return Ok(summary);
        }

        let events: Vec<_> = entries.iter().map(|e| e.event.clone()).collect();
        let outcomes = self.upstream.submit_many(&events).await;

        for (entry, outcome) in entries.iter().zip(outcomes) {
            if outcome.success {
                self.queue.mark_synced(entry.id).await?;
                summary.synced += 1;
            } else {
                let error = outcome.error.as_deref().unwrap_or("upstream rejected");
                let marked = self.queue.mark_failed(entry.id, error, max_attempts).await?;
                summary.failed += 1;
                if marked.terminal {
                    summary.terminal += 1;
                    tracing::warn!(
                        entry_id = entry.id,
                        fingerprint = %entry.fingerprint,
                        attempts = marked.attempts,
                        error,
                        "entry parked as terminally failed"
                    );
                }
            }
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        Ok(summary)
    }

    async fn finish_cycle(&self, summary: CycleSummary) {
        *self.last_cycle.write().await = Some(summary);
        let _ = self.cycle_tx.send(summary);
        if summary.claimed > 0 {
            tracing::info!(
                claimed = summary.claimed,
                synced = summary.synced,
                failed = summary.failed,
                terminal = summary.terminal,
                duration_ms = summary.duration_ms,
                "sync cycle complete"
            );
        }
    }
}

/// Spawn the background drain loop. An immediate first drain runs on start;
/// after that the loop wakes every `sync_interval` (re-read after each
/// settings update). On shutdown the current cycle finishes first.
pub fn spawn_forwarder(forwarder: Arc<Forwarder>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        *forwarder.phase.write().await = Phase::Running;

        if let Err(e) = forwarder.drain().await {
            tracing::warn!(err = %e, "initial drain failed");
        }

        loop {
            let interval = forwarder.settings.read().await.sync_interval();
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = forwarder.reconfigured.notified() => continue,
                _ = tokio::time::sleep(interval) => {}
            }
            if let Err(e) = forwarder.drain().await {
                tracing::warn!(err = %e, "drain cycle failed");
            }
        }

        *forwarder.phase.write().await = Phase::Stopped;
        tracing::info!("forwarder stopped");
    });
}
