// Change-log append and cursor behaviour

mod common;

use chrono::{Duration, Utc};
use common::*;
use pitr_core::errors::ExErrorKind;
use pitr_store::{ChangeLogQuery, ChangeLogRepo};

#[test]
fn test_append_rejects_missing_tenant() {
    let (_dir, conn) = setup_test_env();
    let mut entry = change(TENANT, "a", "id1", 1);
    entry.tenant_id = String::new();

    let err = ChangeLogRepo::append(&conn, &entry).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::Validation);
}

#[test]
fn test_cursor_pages_in_order() {
    let (_dir, conn) = setup_test_env();
    let base = Utc::now();
    // Same timestamp for several entries: sequence breaks the tie
    for i in 0..7 {
        let mut entry = change(TENANT, "a", &format!("id{}", i), i);
        entry.changed_at = base + Duration::milliseconds((i / 3) as i64);
        ChangeLogRepo::append(&conn, &entry).unwrap();
    }

    let entries = ChangeLogQuery::new(TENANT)
        .page_size(2)
        .collect(&conn)
        .unwrap();
    assert_eq!(entries.len(), 7);
    let ids: Vec<_> = entries.iter().map(|e| e.record_id.clone()).collect();
    assert_eq!(ids, (0..7).map(|i| format!("id{}", i)).collect::<Vec<_>>());
    assert!(entries.windows(2).all(|w| w[0].sequence < w[1].sequence));
}

#[test]
fn test_cursor_is_restartable() {
    let (_dir, conn) = setup_test_env();
    for i in 0..3 {
        ChangeLogRepo::append(&conn, &change(TENANT, "a", "id1", i)).unwrap();
    }
    let query = ChangeLogQuery::new(TENANT).table("a").page_size(1);

    let first: Vec<_> = query.cursor(&conn).take(2).collect::<Result<_, _>>().unwrap();
    assert_eq!(first.len(), 2);
    let all = query.collect(&conn).unwrap();
    assert_eq!(all.len(), 3);
}

#[test]
fn test_window_and_watermark_filters() {
    let (_dir, conn) = setup_test_env();
    let base = Utc::now() - Duration::hours(1);
    let mut sequences = Vec::new();
    for i in 0..4 {
        let mut entry = change(TENANT, "a", "id1", i);
        entry.changed_at = base + Duration::minutes(i);
        sequences.push(ChangeLogRepo::append(&conn, &entry).unwrap());
    }
    ChangeLogRepo::append(&conn, &change(OTHER_TENANT, "a", "id1", 9)).unwrap();

    let windowed = ChangeLogQuery::new(TENANT)
        .from(base)
        .to(base + Duration::minutes(2))
        .collect(&conn)
        .unwrap();
    assert_eq!(windowed.len(), 2);

    let after = ChangeLogQuery::new(TENANT)
        .after_sequence(sequences[2])
        .collect(&conn)
        .unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].sequence, sequences[3]);
}

#[test]
fn test_stats_and_bounds() {
    let (_dir, conn) = setup_test_env();
    let base = Utc::now() - Duration::hours(1);
    let mut entry = change(TENANT, "a", "id1", 1);
    entry.changed_at = base;
    ChangeLogRepo::append(&conn, &entry).unwrap();
    let mut entry = change(TENANT, "b", "id1", 2);
    entry.operation = pitr_core::ChangeOperation::Delete;
    entry.new_data = None;
    entry.changed_at = base + Duration::minutes(5);
    ChangeLogRepo::append(&conn, &entry).unwrap();

    let stats = ChangeLogRepo::stats(&conn, &ChangeLogQuery::new(TENANT)).unwrap();
    assert_eq!(stats.update_count, 1);
    assert_eq!(stats.delete_count, 1);
    assert_eq!(stats.affected_tables, vec!["a", "b"]);

    let only_b = ChangeLogRepo::stats(&conn, &ChangeLogQuery::new(TENANT).tables(&["b".to_string()]))
        .unwrap();
    assert_eq!(only_b.total_operations, 1);
    assert_eq!(only_b.affected_tables, vec!["b"]);

    let tables = vec!["a".to_string(), "b".to_string()];
    let earliest = ChangeLogRepo::earliest(&conn, TENANT, &tables, Utc::now()).unwrap();
    let latest = ChangeLogRepo::latest(&conn, TENANT, &tables, Utc::now()).unwrap();
    assert_eq!(earliest.map(|t| t.timestamp_millis()), Some(base.timestamp_millis()));
    assert_eq!(
        latest.map(|t| t.timestamp_millis()),
        Some((base + Duration::minutes(5)).timestamp_millis())
    );
    assert!(ChangeLogRepo::earliest(&conn, TENANT, &tables, base - Duration::minutes(1))
        .unwrap()
        .is_none());
}
