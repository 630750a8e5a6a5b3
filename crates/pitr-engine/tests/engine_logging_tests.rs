#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::*;
use pitr_core::logging_facility::test_capture::init_test_capture;
use pitr_core_types::schema::{EVENT_END, EVENT_END_ERROR, EVENT_START};
use pitr_engine::commands::rollback::execute_rollback;
use pitr_engine::commands::snapshot::{create_snapshot, SnapshotRequest};
use pitr_engine::{RollbackRequest, RollbackWorker};

#[test]
fn test_create_snapshot_logs_lifecycle() {
    let capture = init_test_capture();
    let tenant = "log-tenant-snapshot";
    let mut env = setup();
    register_ab(&mut env.conn);
    pitr_engine::commands::tables::grant_table(&env.conn, tenant, "a").unwrap();

    let snapshot_id = create_snapshot(
        &mut env.conn,
        &env.config,
        &SnapshotRequest::new(tenant, &["a"], "alice", "logged"),
    )
    .unwrap();

    let start = capture
        .find("create_snapshot", EVENT_START)
        .expect("start event captured");
    assert!(capture.count_events(|e| {
        e.is("create_snapshot", EVENT_START) && e.field("tenant_id") == Some(tenant)
    }) >= 1);
    assert!(start.field("component").is_some());
    let end = capture
        .events()
        .into_iter()
        .find(|e| e.is("create_snapshot", EVENT_END) && e.field("snapshot_id") == Some(snapshot_id.as_str()))
        .expect("end event captured");
    assert!(end.field("duration_ms").is_some());
}

#[test]
fn test_rejected_rollback_logs_error_code() {
    let capture = init_test_capture();
    let mut env = setup();

    execute_rollback(
        &mut env.conn,
        &env.config,
        &RollbackRequest::new("log-tenant-missing", "no-such-snapshot", "bob", "x"),
        false,
    )
    .unwrap_err();

    let errors = capture.count_events(|e| {
        e.is("execute_rollback", EVENT_END_ERROR) && e.field("err.code") == Some("ERR_NOT_FOUND")
    });
    assert!(errors >= 1);
}

#[test]
fn test_rollback_logs_every_transition() {
    let capture = init_test_capture();
    let mut env = setup();
    register_ab(&mut env.conn);
    seed_ab(&mut env.conn, TENANT);
    let snapshot_id = snapshot_ab(&mut env, TENANT);

    let record = execute_rollback(
        &mut env.conn,
        &env.config,
        &RollbackRequest::new(TENANT, &snapshot_id, "bob", "logged"),
        false,
    )
    .unwrap()
    .into_record()
    .unwrap();

    let statuses = capture.rollback_transitions(&record.id);

    assert_eq!(
        statuses,
        vec![
            "validating",
            "constraints_disabled",
            "restoring",
            "reenabling",
            "validating_integrity",
            "completed",
        ]
    );

    capture.assert_event_exists("execute_rollback", EVENT_END);
}

#[test]
fn test_worker_logs_share_request_id() {
    let capture = init_test_capture();
    let mut env = setup();
    register_ab(&mut env.conn);
    seed_ab(&mut env.conn, TENANT);
    let snapshot_id = snapshot_ab(&mut env, TENANT);

    let worker = RollbackWorker::spawn(env.db_path(), env.config.clone()).unwrap();
    let rollback_id = worker
        .submit(&RollbackRequest::new(TENANT, &snapshot_id, "bob", "correlated"))
        .unwrap();
    // Joins the worker thread, so its events are in the buffer afterwards
    worker.shutdown();

    let request_id_of = |message: &str| {
        capture
            .events()
            .into_iter()
            .find(|e| e.message() == Some(message) && e.field("rollback_id") == Some(rollback_id.as_str()))
            .and_then(|e| e.field("request_id").map(str::to_string))
    };

    let queued = request_id_of("Rollback queued").expect("queued event captured");
    let finished = request_id_of("Worker finished rollback").expect("worker event captured");
    assert_eq!(queued, finished);
}
