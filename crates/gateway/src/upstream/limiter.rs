// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Upstream pacing: concurrency cap, rate reservoir, minimum spacing.

use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Semaphore, SemaphorePermit};

/// Token-bucket reservoir plus dispatch spacing.
struct GateState {
    tokens: u32,
    window_started: Instant,
    last_dispatch: Option<Instant>,
}

/// Paces dispatches to the upstream: at most `max_concurrent` in flight, at
/// most `reservoir` per window (refilled by `refresh` tokens per interval),
/// and at least `min_spacing` between consecutive dispatches.
pub struct RateGate {
    semaphore: Semaphore,
    state: Mutex<GateState>,
    reservoir: u32,
    refresh: u32,
    window: Duration,
    min_spacing: Duration,
}

/// Held for the duration of one upstream request.
pub struct RatePermit<'a> {
    _permit: Result<SemaphorePermit<'a>, tokio::sync::AcquireError>,
}

impl RateGate {
    pub fn new(
        max_concurrent: usize,
        reservoir: u32,
        refresh: u32,
        window: Duration,
        min_spacing: Duration,
    ) -> Self {
        Self {
            semaphore: Semaphore::new(max_concurrent.max(1)),
            state: Mutex::new(GateState {
                tokens: reservoir,
                window_started: Instant::now(),
                last_dispatch: None,
            }),
            reservoir,
            refresh,
            window,
            min_spacing,
        }
    }

    /// Wait for an in-flight slot, a reservoir token, and the spacing gap.
    /// The returned permit must be held until the request completes.
    pub async fn acquire(&self) -> RatePermit<'_> {
        let permit = self.semaphore.acquire().await;

        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();

                // Refill once per elapsed window.
                if self.window > Duration::ZERO {
                    let elapsed = now.duration_since(state.window_started);
                    if elapsed >= self.window {
                        let windows = elapsed.as_nanos() / self.window.as_nanos().max(1);
                        let refill = (windows as u32).saturating_mul(self.refresh);
                        state.tokens = state.tokens.saturating_add(refill).min(self.reservoir);
                        state.window_started = now;
                    }
                }

                let spacing_wait = state
                    .last_dispatch
                    .map(|last| (last + self.min_spacing).saturating_duration_since(now))
                    .unwrap_or(Duration::ZERO);

                if state.tokens > 0 && spacing_wait.is_zero() {
                    state.tokens -= 1;
                    state.last_dispatch = Some(now);
                    None
                } else if state.tokens == 0 {
                    // Out of budget until the next refill.
                    Some(
                        (state.window_started + self.window)
                            .saturating_duration_since(now)
                            .max(Duration::from_millis(10)),
                    )
                } else {
                    Some(spacing_wait)
                }
            };

            match wait {
                None => return RatePermit { _permit: permit },
                Some(d) => tokio::time::sleep(d).await,
            }
        }
    }
}

#[cfg(test)]
#[path = "limiter_tests.rs"]
mod tests;
