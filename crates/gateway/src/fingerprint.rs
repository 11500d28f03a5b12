// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic record identity for attendance events.
//!
//! The server must reject duplicate physical events even when the device
//! forgets it has sent them (network glitch between send and ack). The
//! fingerprint is a SHA-256 over the normalized identity fields, unless the
//! device supplied its own `client_record_id`, which wins verbatim.

use sha2::{Digest, Sha256};

use crate::event::AttendanceEvent;

/// Compute the identity fingerprint for an event.
///
/// Normalization order: `employee_id`, timestamp (UTC, second precision),
/// `kind`, `device_id` (empty if absent), joined with `|`.
pub fn fingerprint(event: &AttendanceEvent) -> String {
    if let Some(client_id) = &event.client_record_id {
        return client_id.clone();
    }

    let canonical_time = event.timestamp.format("%Y-%m-%dT%H:%M:%SZ");
    let input = format!(
        "{}|{}|{}|{}",
        event.employee_id,
        canonical_time,
        event.kind.as_str(),
        event.device_id.as_deref().unwrap_or(""),
    );
    hex_digest(&input)
}

fn hex_digest(input: &str) -> String {
    let hash = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(hash.len() * 2);
    for b in hash {
        out.push(char::from(HEX[(b >> 4) as usize]));
        out.push(char::from(HEX[(b & 0xf) as usize]));
    }
    out
}

const HEX: &[u8; 16] = b"0123456789abcdef";

#[cfg(test)]
#[path = "fingerprint_tests.rs"]
mod tests;
