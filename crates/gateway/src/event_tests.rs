// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn base_event() -> AttendanceEvent {
    AttendanceEvent {
        employee_id: "E1".to_owned(),
        timestamp: "2024-06-10T08:30:00Z".parse().expect("valid timestamp"),
        kind: ClockKind::ClockIn,
        device_id: Some("D1".to_owned()),
        site_id: None,
        latitude: None,
        longitude: None,
        client_record_id: None,
    }
}

#[test]
fn valid_event_passes() {
    assert!(base_event().validate().is_ok());
}

#[test]
fn empty_employee_id_rejected() {
    let mut ev = base_event();
    ev.employee_id = "  ".to_owned();
    assert!(ev.validate().is_err());
}

#[test]
fn out_of_range_coordinates_rejected() {
    let mut ev = base_event();
    ev.latitude = Some(91.0);
    assert!(ev.validate().is_err());

    let mut ev = base_event();
    ev.longitude = Some(-180.5);
    assert!(ev.validate().is_err());
}

#[test]
fn kind_serializes_as_hyphenated_literal() -> anyhow::Result<()> {
    let json = serde_json::to_value(ClockKind::ClockOut)?;
    assert_eq!(json, serde_json::json!("clock-out"));
    let back: ClockKind = serde_json::from_value(json)?;
    assert_eq!(back, ClockKind::ClockOut);
    Ok(())
}

#[test]
fn timestamp_round_trips() -> anyhow::Result<()> {
    let ev = base_event();
    let json = serde_json::to_string(&ev)?;
    let back: AttendanceEvent = serde_json::from_str(&json)?;
    assert_eq!(back.timestamp, ev.timestamp);
    Ok(())
}
