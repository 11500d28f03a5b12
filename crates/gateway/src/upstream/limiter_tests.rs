// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn dispatches_respect_min_spacing() {
    let gate = RateGate::new(3, 100, 100, Duration::from_secs(60), Duration::from_millis(50));

    let start = Instant::now();
    for _ in 0..3 {
        let _permit = gate.acquire().await;
    }
    // Two gaps of 50ms between three dispatches.
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn reservoir_blocks_until_refill() {
    let gate = RateGate::new(10, 2, 2, Duration::from_millis(100), Duration::ZERO);

    let start = Instant::now();
    for _ in 0..3 {
        let _permit = gate.acquire().await;
    }
    // Third dispatch needs the next window's tokens.
    assert!(start.elapsed() >= Duration::from_millis(90));
}

#[tokio::test]
async fn concurrency_cap_serialises_in_flight_requests() {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    let gate = Arc::new(RateGate::new(1, 100, 100, Duration::from_secs(60), Duration::ZERO));
    let in_flight = Arc::new(AtomicU32::new(0));
    let peak = Arc::new(AtomicU32::new(0));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let gate = Arc::clone(&gate);
        let in_flight = Arc::clone(&in_flight);
        let peak = Arc::clone(&peak);
        handles.push(tokio::spawn(async move {
            let _permit = gate.acquire().await;
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
        }));
    }
    for h in handles {
        let _ = h.await;
    }

    assert_eq!(peak.load(Ordering::SeqCst), 1);
}
