// Data-plane writes and foreign-key enforcement

mod common;

use common::*;
use pitr_core::errors::ExErrorKind;
use pitr_store::{LeaseRepo, RowRepo, SchemaRepo};

#[test]
fn test_child_reference_must_exist_in_same_tenant() {
    let (_dir, mut conn) = setup_test_env();
    register_ab(&mut conn);
    let registry = SchemaRepo::load_registry(&conn).unwrap();
    let (a, b) = (registry.get("a").unwrap(), registry.get("b").unwrap());

    RowRepo::insert(&conn, OTHER_TENANT, a, &row_a("id1", 1)).unwrap();

    let err = RowRepo::insert(&conn, TENANT, b, &row_b("id1", "id1", 10)).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::Constraint);

    RowRepo::insert(&conn, TENANT, a, &row_a("id1", 1)).unwrap();
    RowRepo::insert(&conn, TENANT, b, &row_b("id1", "id1", 10)).unwrap();
    assert_eq!(RowRepo::count(&conn, TENANT, "b").unwrap(), 1);
}

#[test]
fn test_parent_delete_restricted_while_referenced() {
    let (_dir, mut conn) = setup_test_env();
    register_ab(&mut conn);
    let registry = SchemaRepo::load_registry(&conn).unwrap();
    let (a, b) = (registry.get("a").unwrap(), registry.get("b").unwrap());

    RowRepo::insert(&conn, TENANT, a, &row_a("id1", 1)).unwrap();
    RowRepo::insert(&conn, TENANT, b, &row_b("id1", "id1", 10)).unwrap();

    let err = RowRepo::delete(&conn, TENANT, a, "id1").unwrap_err();
    assert_eq!(err.code(), "ERR_CONSTRAINT");

    RowRepo::delete(&conn, TENANT, b, "id1").unwrap();
    RowRepo::delete(&conn, TENANT, a, "id1").unwrap();
}

#[test]
fn test_disabled_constraint_not_enforced() {
    let (_dir, mut conn) = setup_test_env();
    register_ab(&mut conn);
    let registry = SchemaRepo::load_registry(&conn).unwrap();
    let b = registry.get("b").unwrap();

    LeaseRepo::acquire(&conn, "rb-1", "b", chrono::Utc::now()).unwrap();
    RowRepo::insert(&conn, TENANT, b, &row_b("id1", "missing", 10)).unwrap();

    LeaseRepo::release(&conn, "rb-1", "b", chrono::Utc::now()).unwrap();
    let orphans = LeaseRepo::orphans(&conn, "b").unwrap();
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].record_id, "id1");
    assert_eq!(orphans[0].tenant_id, TENANT);
}

#[test]
fn test_rows_validated_against_schema() {
    let (_dir, mut conn) = setup_test_env();
    register_ab(&mut conn);
    let registry = SchemaRepo::load_registry(&conn).unwrap();
    let a = registry.get("a").unwrap();

    let bad = pitr_core::TypedRow::new().with("id", "id1").with("val", "one");
    let err = RowRepo::insert(&conn, TENANT, a, &bad).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::Validation);
}

#[test]
fn test_replace_table_is_tenant_scoped() {
    let (_dir, mut conn) = setup_test_env();
    register_ab(&mut conn);
    let registry = SchemaRepo::load_registry(&conn).unwrap();
    let a = registry.get("a").unwrap();

    RowRepo::insert(&conn, TENANT, a, &row_a("id1", 1)).unwrap();
    RowRepo::insert(&conn, TENANT, a, &row_a("id2", 2)).unwrap();
    RowRepo::insert(&conn, OTHER_TENANT, a, &row_a("id1", 100)).unwrap();

    let written = RowRepo::replace_table(&conn, TENANT, a, &[row_a("id1", 5)], None).unwrap();
    assert_eq!(written, 1);
    assert_eq!(RowRepo::list(&conn, TENANT, "a").unwrap(), vec![row_a("id1", 5)]);
    assert_eq!(
        RowRepo::list(&conn, OTHER_TENANT, "a").unwrap(),
        vec![row_a("id1", 100)]
    );
}

#[test]
fn test_replace_table_honours_deadline() {
    let (_dir, mut conn) = setup_test_env();
    register_ab(&mut conn);
    let registry = SchemaRepo::load_registry(&conn).unwrap();
    let a = registry.get("a").unwrap();

    let err = RowRepo::replace_table(
        &conn,
        TENANT,
        a,
        &[row_a("id1", 1)],
        Some(std::time::Instant::now()),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::Timeout);
    assert_eq!(RowRepo::count(&conn, TENANT, "a").unwrap(), 0);
}

#[test]
fn test_grant_requires_registered_table() {
    let (_dir, conn) = setup_test_env();
    let err = SchemaRepo::grant_table(&conn, TENANT, "ghost").unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::Validation);
}
