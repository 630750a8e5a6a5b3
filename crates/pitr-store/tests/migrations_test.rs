#![allow(clippy::unwrap_used, clippy::expect_used)]

use pitr_store::migrations::{applied_migrations, apply_migrations, MIGRATIONS};
use rusqlite::Connection;

fn table_names(conn: &Connection) -> Vec<String> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .unwrap();
    stmt.query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<Vec<String>, _>>()
        .unwrap()
}

#[test]
fn test_fresh_database_gets_every_table() {
    let mut conn = Connection::open_in_memory().unwrap();
    apply_migrations(&mut conn).unwrap();

    let tables = table_names(&conn);
    for expected in [
        "schema_version",
        "table_schemas",
        "tenant_table_grants",
        "fk_constraints",
        "managed_rows",
        "change_log",
        "pitr_snapshots",
        "rollback_records",
        "backup_jobs",
    ] {
        assert!(tables.iter().any(|t| t == expected), "missing table {}", expected);
    }
}

#[test]
fn test_rerun_records_nothing_new() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("pitr.db");

    let mut conn = Connection::open(&path).unwrap();
    apply_migrations(&mut conn).unwrap();
    drop(conn);

    let mut conn = Connection::open(&path).unwrap();
    apply_migrations(&mut conn).unwrap();
    assert_eq!(applied_migrations(&conn).unwrap().len(), MIGRATIONS.len());
}
