#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use chrono::{Duration, Utc};
use common::*;
use pitr_core::errors::ExErrorKind;
use pitr_core::{BackupKind, BackupStatus};
use pitr_engine::commands::backups::{
    complete_backup_job, fail_backup_job, get_backup_chain, record_backup_job,
};
use pitr_engine::commands::rollback::execute_rollback;
use pitr_engine::commands::stats::{backup_statistics, health_score, health_score_at};
use pitr_engine::RollbackRequest;

#[test]
fn test_backup_chain_runs_from_full_base() {
    let env = setup();

    let full = record_backup_job(&env.conn, TENANT, BackupKind::Full, None).unwrap();
    assert_eq!(full.status, BackupStatus::Running);
    let inc1 = record_backup_job(&env.conn, TENANT, BackupKind::Incremental, Some(&full.id)).unwrap();
    let inc2 = record_backup_job(&env.conn, TENANT, BackupKind::Incremental, Some(&inc1.id)).unwrap();

    let chain = get_backup_chain(&env.conn, &inc2.id).unwrap();
    let ids: Vec<&str> = chain.iter().map(|j| j.id.as_str()).collect();
    assert_eq!(ids, vec![full.id.as_str(), inc1.id.as_str(), inc2.id.as_str()]);

    assert_eq!(get_backup_chain(&env.conn, &full.id).unwrap().len(), 1);
}

#[test]
fn test_backup_parent_rules() {
    let env = setup();
    let full = record_backup_job(&env.conn, TENANT, BackupKind::Full, None).unwrap();

    let err = record_backup_job(&env.conn, TENANT, BackupKind::Incremental, None).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::Validation);

    let err = record_backup_job(&env.conn, TENANT, BackupKind::Full, Some(&full.id)).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::Validation);

    let err = record_backup_job(&env.conn, OTHER_TENANT, BackupKind::Incremental, Some(&full.id))
        .unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::Validation);

    let err = get_backup_chain(&env.conn, "missing").unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::NotFound);
}

#[test]
fn test_backup_statistics_fold_outcomes() {
    let env = setup();

    let ok = record_backup_job(&env.conn, TENANT, BackupKind::Full, None).unwrap();
    complete_backup_job(&env.conn, &ok.id, 1_000).unwrap();
    let bad = record_backup_job(&env.conn, TENANT, BackupKind::Full, None).unwrap();
    let failed = fail_backup_job(&env.conn, &bad.id, "disk full").unwrap();
    assert_eq!(failed.retry_count, 1);
    assert_eq!(failed.error_message.as_deref(), Some("disk full"));
    record_backup_job(&env.conn, TENANT, BackupKind::Full, None).unwrap();

    let stats = backup_statistics(&env.conn, TENANT).unwrap();
    assert_eq!(stats.successes, 1);
    assert_eq!(stats.failures, 1);
    assert_eq!(stats.running, 1);
    assert_eq!(stats.total_size_bytes, 1_000);
    assert!(stats.last_success_at.is_some());
    assert!(stats.avg_duration_ms.is_some());

    assert_eq!(
        complete_backup_job(&env.conn, "missing", 1).unwrap_err().kind(),
        ExErrorKind::NotFound
    );
}

#[test]
fn test_health_score_without_history_is_zero() {
    let env = setup();
    assert_eq!(health_score(&env.conn, TENANT).unwrap(), 0);
}

#[test]
fn test_health_score_combines_backups_rollbacks_and_recency() {
    let mut env = setup();
    register_ab(&mut env.conn);
    seed_ab(&mut env.conn, TENANT);

    for _ in 0..3 {
        let job = record_backup_job(&env.conn, TENANT, BackupKind::Full, None).unwrap();
        complete_backup_job(&env.conn, &job.id, 10).unwrap();
    }
    let job = record_backup_job(&env.conn, TENANT, BackupKind::Full, None).unwrap();
    fail_backup_job(&env.conn, &job.id, "timeout").unwrap();

    let snapshot_id = snapshot_ab(&mut env, TENANT);
    execute_rollback(
        &mut env.conn,
        &env.config,
        &RollbackRequest::new(TENANT, &snapshot_id, "bob", "drill"),
        false,
    )
    .unwrap();

    // 60 * 3/4 + 20 + 20
    let now = Utc::now();
    assert_eq!(health_score_at(&env.conn, TENANT, now).unwrap(), 85);
    assert_eq!(
        health_score_at(&env.conn, TENANT, now + Duration::days(3)).unwrap(),
        75
    );
    assert_eq!(
        health_score_at(&env.conn, TENANT, now + Duration::days(30)).unwrap(),
        65
    );

    // Scores are per tenant
    assert_eq!(health_score(&env.conn, OTHER_TENANT).unwrap(), 0);
}
