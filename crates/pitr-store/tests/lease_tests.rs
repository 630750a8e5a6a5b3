// Constraint lease acquisition and release

mod common;

use chrono::Utc;
use common::*;
use pitr_core::errors::ExErrorKind;
use pitr_store::{LeaseRepo, SchemaRepo};

#[test]
fn test_acquire_records_owner() {
    let (_dir, mut conn) = setup_test_env();
    register_ab(&mut conn);

    let leases = LeaseRepo::acquire(&conn, "rb-1", "b", Utc::now()).unwrap();
    assert_eq!(leases.len(), 1);
    assert!(leases[0].is_owned_by("rb-1"));
    assert!(leases[0].disabled_at.is_some());
    assert_eq!(
        leases[0].definition,
        "CONSTRAINT fk_b_a FOREIGN KEY (a_id) REFERENCES a(id)"
    );

    // Re-entrant for the same owner
    LeaseRepo::acquire(&conn, "rb-1", "b", Utc::now()).unwrap();
}

#[test]
fn test_second_owner_rejected() {
    let (_dir, mut conn) = setup_test_env();
    register_ab(&mut conn);

    LeaseRepo::acquire(&conn, "rb-1", "b", Utc::now()).unwrap();
    let err = LeaseRepo::acquire(&conn, "rb-2", "b", Utc::now()).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::Concurrency);
    assert!(err.message().contains("rb-1"));
}

#[test]
fn test_release_clears_ownership() {
    let (_dir, mut conn) = setup_test_env();
    register_ab(&mut conn);

    LeaseRepo::acquire(&conn, "rb-1", "b", Utc::now()).unwrap();
    let released = LeaseRepo::release(&conn, "rb-1", "b", Utc::now()).unwrap();
    assert_eq!(released.len(), 1);
    assert!(released[0].re_enabled_at.is_some());
    assert!(!released[0].is_disabled);

    assert!(LeaseRepo::held_by(&conn, "rb-1").unwrap().is_empty());
    let stored = LeaseRepo::list_for_table(&conn, "b").unwrap();
    assert!(!stored[0].is_disabled);
    assert_eq!(stored[0].owner_rollback_id, None);

    LeaseRepo::acquire(&conn, "rb-2", "b", Utc::now()).unwrap();
}

#[test]
fn test_release_by_non_owner_is_noop() {
    let (_dir, mut conn) = setup_test_env();
    register_ab(&mut conn);

    LeaseRepo::acquire(&conn, "rb-1", "b", Utc::now()).unwrap();
    let released = LeaseRepo::release(&conn, "rb-2", "b", Utc::now()).unwrap();
    assert!(released.is_empty());
    assert_eq!(LeaseRepo::held_by(&conn, "rb-1").unwrap().len(), 1);
}

#[test]
fn test_reregister_blocked_while_leased() {
    let (_dir, mut conn) = setup_test_env();
    register_ab(&mut conn);

    LeaseRepo::acquire(&conn, "rb-1", "b", Utc::now()).unwrap();
    let err = SchemaRepo::register_table(&mut conn, &schema_b()).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::Concurrency);
}

#[test]
fn test_table_without_constraints_acquires_nothing() {
    let (_dir, mut conn) = setup_test_env();
    register_ab(&mut conn);
    assert!(LeaseRepo::acquire(&conn, "rb-1", "a", Utc::now())
        .unwrap()
        .is_empty());
}
