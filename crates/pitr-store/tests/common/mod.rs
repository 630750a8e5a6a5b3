#![allow(dead_code)]

use chrono::Utc;
use pitr_core::{ColumnDef, ColumnType, ForeignKeyDef, NewChangeLogEntry, TableSchema, TypedRow};
use pitr_store::SchemaRepo;
use rusqlite::Connection;
use tempfile::TempDir;

pub const TENANT: &str = "tenant-t";
pub const OTHER_TENANT: &str = "tenant-u";

/// Migrated database file in a fresh temp dir
pub fn setup_test_env() -> (TempDir, Connection) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");

    let mut conn = pitr_store::db::open(&db_path).unwrap();
    pitr_store::db::configure(&conn, std::time::Duration::from_millis(500)).unwrap();
    pitr_store::migrations::apply_migrations(&mut conn).unwrap();

    (temp_dir, conn)
}

pub fn schema_a() -> TableSchema {
    TableSchema::new("a", "id")
        .column(ColumnDef::new("id", ColumnType::Text))
        .column(ColumnDef::new("val", ColumnType::Integer))
}

pub fn schema_b() -> TableSchema {
    TableSchema::new("b", "id")
        .column(ColumnDef::new("id", ColumnType::Text))
        .column(ColumnDef::new("a_id", ColumnType::Text).nullable())
        .column(ColumnDef::new("val", ColumnType::Integer))
        .foreign_key(ForeignKeyDef::new("fk_b_a", "a_id", "a", "id"))
}

/// Register `a` and `b` (b.a_id → a.id) and grant both to both tenants
pub fn register_ab(conn: &mut Connection) {
    SchemaRepo::register_table(conn, &schema_a()).unwrap();
    SchemaRepo::register_table(conn, &schema_b()).unwrap();
    for tenant in [TENANT, OTHER_TENANT] {
        SchemaRepo::grant_table(conn, tenant, "a").unwrap();
        SchemaRepo::grant_table(conn, tenant, "b").unwrap();
    }
}

pub fn row_a(id: &str, val: i64) -> TypedRow {
    TypedRow::new().with("id", id).with("val", val)
}

pub fn row_b(id: &str, a_id: &str, val: i64) -> TypedRow {
    TypedRow::new().with("id", id).with("a_id", a_id).with("val", val)
}

pub fn change(tenant: &str, table: &str, record_id: &str, new_val: i64) -> NewChangeLogEntry {
    NewChangeLogEntry {
        tenant_id: tenant.to_string(),
        table_name: table.to_string(),
        record_id: record_id.to_string(),
        operation: pitr_core::ChangeOperation::Update,
        old_data: None,
        new_data: Some(row_a(record_id, new_val)),
        changed_at: Utc::now(),
        backup_job_id: None,
    }
}
