#![allow(dead_code)]

use pitr_core::{ColumnDef, ColumnType, EngineConfig, ForeignKeyDef, TableSchema, TypedRow, Value};
use pitr_engine::commands::snapshot::{create_snapshot, SnapshotRequest};
use pitr_engine::commands::tables::{apply_tracked_write, grant_table, register_table, RowWrite};
use pitr_engine::open_database;
use pitr_store::RowRepo;
use rusqlite::Connection;
use std::path::PathBuf;
use tempfile::TempDir;

pub const TENANT: &str = "tenant-t";
pub const OTHER_TENANT: &str = "tenant-u";

pub struct TestEnv {
    pub dir: TempDir,
    pub conn: Connection,
    pub config: EngineConfig,
}

impl TestEnv {
    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join("pitr.db")
    }

    /// Second connection to the same database file
    pub fn connect(&self) -> Connection {
        open_database(self.db_path(), &self.config).unwrap()
    }
}

pub fn setup() -> TestEnv {
    setup_with(EngineConfig::default())
}

pub fn setup_with(config: EngineConfig) -> TestEnv {
    let dir = TempDir::new().unwrap();
    let conn = open_database(dir.path().join("pitr.db"), &config).unwrap();
    TestEnv { dir, conn, config }
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
    register_table(conn, &schema_a()).unwrap();
    register_table(conn, &schema_b()).unwrap();
    for tenant in [TENANT, OTHER_TENANT] {
        grant_table(conn, tenant, "a").unwrap();
        grant_table(conn, tenant, "b").unwrap();
    }
}

pub fn row_a(id: &str, val: i64) -> TypedRow {
    TypedRow::new().with("id", id).with("val", val)
}

pub fn row_b(id: &str, a_id: &str, val: i64) -> TypedRow {
    TypedRow::new().with("id", id).with("a_id", a_id).with("val", val)
}

pub fn insert(conn: &mut Connection, tenant: &str, table: &str, row: TypedRow) {
    apply_tracked_write(conn, tenant, table, RowWrite::Insert(row)).unwrap();
}

pub fn update(conn: &mut Connection, tenant: &str, table: &str, row: TypedRow) {
    apply_tracked_write(conn, tenant, table, RowWrite::Update(row)).unwrap();
}

pub fn delete(conn: &mut Connection, tenant: &str, table: &str, id: &str) {
    apply_tracked_write(conn, tenant, table, RowWrite::Delete(id.to_string())).unwrap();
}

/// Tenant rows a1(val 1) and b1(a1, val 10)
pub fn seed_ab(conn: &mut Connection, tenant: &str) {
    insert(conn, tenant, "a", row_a("a1", 1));
    insert(conn, tenant, "b", row_b("b1", "a1", 10));
}

pub fn snapshot_ab(env: &mut TestEnv, tenant: &str) -> String {
    create_snapshot(
        &mut env.conn,
        &env.config,
        &SnapshotRequest::new(tenant, &["a", "b"], "alice", "before change"),
    )
    .unwrap()
}

/// Integer `val` of a row, None when the row is absent
pub fn val_of(conn: &Connection, tenant: &str, table: &str, id: &str) -> Option<i64> {
    RowRepo::get(conn, tenant, table, id)
        .unwrap()
        .and_then(|row| match row.get("val") {
            Some(Value::Integer(v)) => Some(*v),
            _ => None,
        })
}

pub fn count(conn: &Connection, tenant: &str, table: &str) -> u64 {
    RowRepo::count(conn, tenant, table).unwrap()
}
