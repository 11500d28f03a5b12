// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session persistence: load/save to JSON file with atomic writes, so device
//! sessions survive a gateway restart.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::Session;

/// Persisted session state, keyed by session id.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PersistedSessions {
    pub sessions: HashMap<String, Session>,
}

/// Load persisted sessions from a JSON file.
pub fn load(path: &Path) -> anyhow::Result<PersistedSessions> {
    let contents = std::fs::read_to_string(path)?;
    let sessions: PersistedSessions = serde_json::from_str(&contents)?;
    Ok(sessions)
}

/// Save sessions to a JSON file atomically (write tmp + rename).
pub fn save(path: &Path, sessions: &PersistedSessions) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(sessions)?;
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
