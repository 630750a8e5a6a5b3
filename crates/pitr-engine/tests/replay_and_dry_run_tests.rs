#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use chrono::Duration;
use common::*;
use pitr_core::{ColumnDef, ColumnType, RollbackStatus, TableSchema};
use pitr_engine::commands::rollback::{execute_rollback, get_rollback_history};
use pitr_engine::commands::snapshot::get_snapshot;
use pitr_engine::commands::stats::calculate_stats;
use pitr_engine::commands::tables::{apply_tracked_write_at, grant_table, register_table, RowWrite};
use pitr_engine::{RollbackOutcome, RollbackRequest};

/// Snapshot of a1=1/b1, then changes stamped one and two hours later
fn timeline() -> (TestEnv, String, chrono::DateTime<chrono::Utc>) {
    let mut env = setup();
    register_ab(&mut env.conn);
    seed_ab(&mut env.conn, TENANT);
    let snapshot_id = snapshot_ab(&mut env, TENANT);
    let created_at = get_snapshot(&env.conn, TENANT, &snapshot_id)
        .unwrap()
        .created_at;

    let at = |hours: i64| created_at + Duration::hours(hours);
    apply_tracked_write_at(&mut env.conn, TENANT, "a", RowWrite::Update(row_a("a1", 5)), at(1))
        .unwrap();
    apply_tracked_write_at(
        &mut env.conn,
        TENANT,
        "b",
        RowWrite::Insert(row_b("b2", "a1", 50)),
        at(1),
    )
    .unwrap();
    apply_tracked_write_at(&mut env.conn, TENANT, "a", RowWrite::Update(row_a("a1", 9)), at(2))
        .unwrap();
    apply_tracked_write_at(&mut env.conn, TENANT, "b", RowWrite::Delete("b1".into()), at(2))
        .unwrap();

    (env, snapshot_id, created_at)
}

#[test]
fn test_rollback_to_target_replays_changes_up_to_target() {
    let (mut env, snapshot_id, created_at) = timeline();
    let request = RollbackRequest::new(TENANT, &snapshot_id, "bob", "undo second deploy")
        .target(created_at + Duration::minutes(90));

    let record = execute_rollback(&mut env.conn, &env.config, &request, false)
        .unwrap()
        .into_record()
        .unwrap();

    assert_eq!(record.status, RollbackStatus::Completed);
    assert_eq!(record.integrity_valid, Some(true));
    assert_eq!(val_of(&env.conn, TENANT, "a", "a1"), Some(5));
    assert_eq!(val_of(&env.conn, TENANT, "b", "b1"), Some(10));
    assert_eq!(val_of(&env.conn, TENANT, "b", "b2"), Some(50));
    // Final row counts: a has a1, b has b1 and b2
    assert_eq!(record.rows_restored, 3);
}

#[test]
fn test_target_before_snapshot_restores_snapshot_only() {
    let (mut env, snapshot_id, created_at) = timeline();
    let request = RollbackRequest::new(TENANT, &snapshot_id, "bob", "full undo")
        .target(created_at - Duration::minutes(5));

    let record = execute_rollback(&mut env.conn, &env.config, &request, false)
        .unwrap()
        .into_record()
        .unwrap();

    assert_eq!(record.status, RollbackStatus::Completed);
    assert_eq!(val_of(&env.conn, TENANT, "a", "a1"), Some(1));
    assert_eq!(val_of(&env.conn, TENANT, "b", "b2"), None);
    assert_eq!(record.rows_restored, 2);
}

#[test]
fn test_dry_run_reports_window_and_writes_nothing() {
    let (mut env, snapshot_id, created_at) = timeline();
    let target = created_at + Duration::hours(3);
    let request = RollbackRequest::new(TENANT, &snapshot_id, "bob", "preview").target(target);

    let outcome = execute_rollback(&mut env.conn, &env.config, &request, true).unwrap();
    let stats = match outcome {
        RollbackOutcome::DryRun(stats) => stats,
        RollbackOutcome::Executed(record) => panic!("dry run executed: {:?}", record.id),
    };

    assert_eq!(stats.update_count, 2);
    assert_eq!(stats.insert_count, 1);
    assert_eq!(stats.delete_count, 1);
    assert_eq!(stats.total_operations, 4);
    assert_eq!(stats.affected_tables, vec!["a".to_string(), "b".to_string()]);

    let expected = calculate_stats(&env.conn, &env.config, TENANT, target, Some(created_at)).unwrap();
    assert_eq!(stats, expected);

    // Nothing was written
    assert_eq!(val_of(&env.conn, TENANT, "a", "a1"), Some(9));
    assert_eq!(val_of(&env.conn, TENANT, "b", "b1"), None);
    assert!(get_rollback_history(&env.conn, &env.config, TENANT, None)
        .unwrap()
        .is_empty());
    assert!(!get_snapshot(&env.conn, TENANT, &snapshot_id).unwrap().is_rolled_back);
}

#[test]
fn test_dry_run_window_ends_at_target() {
    let (mut env, snapshot_id, created_at) = timeline();
    let request = RollbackRequest::new(TENANT, &snapshot_id, "bob", "preview")
        .target(created_at + Duration::minutes(90));

    let stats = match execute_rollback(&mut env.conn, &env.config, &request, true).unwrap() {
        RollbackOutcome::DryRun(stats) => stats,
        RollbackOutcome::Executed(_) => panic!("dry run executed"),
    };
    assert_eq!(stats.total_operations, 2);
    assert_eq!(stats.update_count, 1);
    assert_eq!(stats.insert_count, 1);
}

#[test]
fn test_calculate_stats_without_base_counts_all_history() {
    let (env, _, created_at) = timeline();

    let stats = calculate_stats(
        &env.conn,
        &env.config,
        TENANT,
        created_at + Duration::hours(3),
        None,
    )
    .unwrap();
    // Two seed inserts plus the four timeline changes
    assert_eq!(stats.total_operations, 6);
    assert_eq!(stats.insert_count, 3);
    assert!(stats.earliest_change.unwrap() <= created_at);
    assert_eq!(stats.latest_change, Some(created_at + Duration::hours(2)));
}

#[test]
fn test_dry_run_matches_calculate_stats_with_tables_outside_snapshot() {
    let (mut env, snapshot_id, created_at) = timeline();
    let audit = TableSchema::new("c", "id")
        .column(ColumnDef::new("id", ColumnType::Text))
        .column(ColumnDef::new("val", ColumnType::Integer));
    register_table(&mut env.conn, &audit).unwrap();
    grant_table(&env.conn, TENANT, "c").unwrap();
    apply_tracked_write_at(
        &mut env.conn,
        TENANT,
        "c",
        RowWrite::Insert(row_a("c1", 7)),
        created_at + Duration::minutes(30),
    )
    .unwrap();

    let target = created_at + Duration::hours(3);
    let request = RollbackRequest::new(TENANT, &snapshot_id, "bob", "preview").target(target);
    let stats = match execute_rollback(&mut env.conn, &env.config, &request, true).unwrap() {
        RollbackOutcome::DryRun(stats) => stats,
        RollbackOutcome::Executed(_) => panic!("dry run executed"),
    };

    let expected = calculate_stats(&env.conn, &env.config, TENANT, target, Some(created_at)).unwrap();
    assert_eq!(stats, expected);
    assert_eq!(stats.total_operations, 5);
    assert_eq!(stats.insert_count, 2);
    assert_eq!(stats.affected_tables, vec!["a", "b", "c"]);
    assert_eq!(count(&env.conn, TENANT, "c"), 1);
}
