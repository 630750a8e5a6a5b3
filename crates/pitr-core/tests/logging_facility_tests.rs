#![allow(clippy::unwrap_used, clippy::expect_used)]

use pitr_core::errors::{ExError, ExErrorKind, PitrError};
use pitr_core::logging_facility::test_capture::init_test_capture;
use pitr_core::{log_op_end, log_op_error, log_op_start};
use pitr_core_types::schema::{EVENT_END, EVENT_END_ERROR, EVENT_START};

#[test]
fn test_start_event_carries_extra_fields() {
    let capture = init_test_capture();
    let op = "logging_test_start";

    log_op_start!(op, tenant_id = "t1", snapshot_id = "s1");

    let start = capture.find(op, EVENT_START).expect("start event captured");
    assert_eq!(start.field("tenant_id"), Some("t1"));
    assert_eq!(start.field("snapshot_id"), Some("s1"));
    assert_eq!(start.level, tracing::Level::INFO);
}

#[test]
fn test_end_event_records_duration_once() {
    let capture = init_test_capture();
    let op = "logging_test_end";

    log_op_end!(op, duration_ms = 42);

    assert_eq!(capture.count_events(|e| e.is(op, EVENT_END)), 1);
    assert_eq!(capture.find(op, EVENT_END).unwrap().field("duration_ms"), Some("42"));
}

#[test]
fn test_error_event_maps_core_error_code() {
    let capture = init_test_capture();
    let op = "logging_test_cycle";

    let err = PitrError::SchemaCycle {
        tables: vec!["a".into(), "b".into()],
    };
    log_op_error!(op, err, duration_ms = 10);

    let event = capture.find(op, EVENT_END_ERROR).expect("error event captured");
    assert_eq!(event.field("err.code"), Some("ERR_SCHEMA_CYCLE"));
    assert_eq!(event.level, tracing::Level::ERROR);
}

#[test]
fn test_error_event_keeps_rollback_id() {
    let capture = init_test_capture();
    let op = "logging_test_lease";

    let err = ExError::new(ExErrorKind::Concurrency).with_message("lease held");
    log_op_error!(op, err, duration_ms = 1, rollback_id = "rb-9");

    let event = capture.find(op, EVENT_END_ERROR).unwrap();
    assert_eq!(event.field("err.code"), Some("ERR_CONCURRENCY"));
    assert_eq!(event.field("err.message"), Some("lease held"));
    assert_eq!(event.field("rollback_id"), Some("rb-9"));
}

#[test]
fn test_transitions_are_collected_per_rollback() {
    let capture = init_test_capture();

    tracing::debug!(rollback_id = "rb-log-1", status = "validating", "Rollback transition");
    tracing::debug!(rollback_id = "rb-log-2", status = "validating", "Rollback transition");
    tracing::debug!(rollback_id = "rb-log-1", status = "failed", "Rollback transition");

    assert_eq!(capture.rollback_transitions("rb-log-1"), vec!["validating", "failed"]);
}
