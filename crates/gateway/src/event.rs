// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Attendance event model and inbound validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of a clock event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockKind {
    #[serde(rename = "clock-in")]
    ClockIn,
    #[serde(rename = "clock-out")]
    ClockOut,
}

impl ClockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClockIn => "clock-in",
            Self::ClockOut => "clock-out",
        }
    }

    /// ERP checkin `log_type` value.
    pub fn log_type(&self) -> &'static str {
        match self {
            Self::ClockIn => "IN",
            Self::ClockOut => "OUT",
        }
    }
}

/// A single clock-in / clock-out event as submitted by a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceEvent {
    pub employee_id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: ClockKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// Caller-supplied idempotency key. When present it becomes the record
    /// identity verbatim, so a device can re-address the same logical event
    /// across retries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_record_id: Option<String>,
}

impl AttendanceEvent {
    /// Validate field constraints. Returns the first violation found.
    pub fn validate(&self) -> Result<(), String> {
        if self.employee_id.trim().is_empty() {
            return Err("employee_id must not be empty".to_owned());
        }
        if let Some(lat) = self.latitude {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(format!("latitude {lat} out of range -90..90"));
            }
        }
        if let Some(lon) = self.longitude {
            if !(-180.0..=180.0).contains(&lon) {
                return Err(format!("longitude {lon} out of range -180..180"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
