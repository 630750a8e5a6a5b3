//! Managed-table registration, tenant grants and tracked writes.
//!
//! Tracked writes are the path application writes take: the row change and
//! its change-log entry commit in one transaction, so replay always sees
//! every change that reached the data plane.

#![allow(clippy::result_large_err)]

use chrono::{DateTime, Utc};
use pitr_core::errors::{ExError, ExErrorKind};
use pitr_core::{log_op_end, log_op_error, log_op_start};
use pitr_core::{ChangeOperation, NewChangeLogEntry, TableSchema, TypedRow};
use pitr_store::errors::{from_rusqlite, Result};
use pitr_store::{ChangeLogRepo, RowRepo, SchemaRepo};
use rusqlite::{Connection, TransactionBehavior};

use super::elapsed_ms;

/// A single row change against a managed table
#[derive(Debug, Clone, PartialEq)]
pub enum RowWrite {
    Insert(TypedRow),
    Update(TypedRow),
    /// Delete by record id
    Delete(String),
}

impl RowWrite {
    pub fn operation(&self) -> ChangeOperation {
        match self {
            RowWrite::Insert(_) => ChangeOperation::Insert,
            RowWrite::Update(_) => ChangeOperation::Update,
            RowWrite::Delete(_) => ChangeOperation::Delete,
        }
    }
}

/// Register (or replace) a managed table.
///
/// # Errors
///
/// - `ERR_VALIDATION` for a malformed schema or a foreign key to an unknown
///   table
/// - `ERR_CONCURRENCY` while a rollback holds the table's constraints
pub fn register_table(conn: &mut Connection, schema: &TableSchema) -> Result<()> {
    log_op_start!("register_table", table_name = %schema.name);
    let start = std::time::Instant::now();

    SchemaRepo::register_table(conn, schema).map_err(|e| {
        log_op_error!("register_table", e.clone(), duration_ms = elapsed_ms(start));
        e
    })?;

    log_op_end!("register_table", duration_ms = elapsed_ms(start));
    Ok(())
}

/// Add `table_name` to the tables `tenant_id` may snapshot and roll back.
pub fn grant_table(conn: &Connection, tenant_id: &str, table_name: &str) -> Result<()> {
    log_op_start!("grant_table", tenant_id = tenant_id, table_name = table_name);
    let start = std::time::Instant::now();

    SchemaRepo::grant_table(conn, tenant_id, table_name).map_err(|e| {
        log_op_error!("grant_table", e.clone(), duration_ms = elapsed_ms(start));
        e
    })?;

    log_op_end!("grant_table", duration_ms = elapsed_ms(start));
    Ok(())
}

/// Apply a row change and log it, stamped with the current time.
///
/// Returns the change-log sequence of the new entry.
pub fn apply_tracked_write(
    conn: &mut Connection,
    tenant_id: &str,
    table_name: &str,
    write: RowWrite,
) -> Result<i64> {
    apply_tracked_write_at(conn, tenant_id, table_name, write, Utc::now())
}

/// Apply a row change and log it with an explicit `changed_at`.
///
/// Used when importing changes captured elsewhere; ordering among entries
/// with equal timestamps follows append order.
///
/// # Errors
///
/// - `ERR_VALIDATION` if the table is not granted to the tenant or the row
///   does not match the table schema
/// - `ERR_NOT_FOUND` when updating or deleting a missing row
/// - `ERR_CONSTRAINT` when an enabled foreign key rejects the write
pub fn apply_tracked_write_at(
    conn: &mut Connection,
    tenant_id: &str,
    table_name: &str,
    write: RowWrite,
    changed_at: DateTime<Utc>,
) -> Result<i64> {
    let op = write.operation();
    log_op_start!(
        "apply_tracked_write",
        tenant_id = tenant_id,
        table_name = table_name,
        operation = op.as_str()
    );
    let start = std::time::Instant::now();

    let sequence = tracked_write_impl(conn, tenant_id, table_name, write, changed_at).map_err(
        |e| {
            log_op_error!(
                "apply_tracked_write",
                e.clone(),
                duration_ms = elapsed_ms(start)
            );
            e
        },
    )?;

    log_op_end!(
        "apply_tracked_write",
        duration_ms = elapsed_ms(start),
        sequence = sequence
    );
    Ok(sequence)
}

fn tracked_write_impl(
    conn: &mut Connection,
    tenant_id: &str,
    table_name: &str,
    write: RowWrite,
    changed_at: DateTime<Utc>,
) -> Result<i64> {
    if tenant_id.trim().is_empty() {
        return Err(ExError::new(ExErrorKind::Validation)
            .with_op("apply_tracked_write")
            .with_message("tenant_id is required"));
    }

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(from_rusqlite)?;

    SchemaRepo::ensure_granted(&tx, tenant_id, &[table_name.to_string()])?;
    let registry = SchemaRepo::load_registry(&tx)?;
    let schema = registry
        .get(table_name)
        .map_err(|e| ExError::from(e).with_op("apply_tracked_write"))?;

    let operation = write.operation();
    let (record_id, old_data, new_data) = match write {
        RowWrite::Insert(row) => {
            let record_id = RowRepo::insert(&tx, tenant_id, schema, &row)?;
            (record_id, None, Some(row))
        }
        RowWrite::Update(row) => {
            let (record_id, old) = RowRepo::update(&tx, tenant_id, schema, &row)?;
            (record_id, Some(old), Some(row))
        }
        RowWrite::Delete(record_id) => {
            let old = RowRepo::delete(&tx, tenant_id, schema, &record_id)?;
            (record_id, Some(old), None)
        }
    };

    let sequence = ChangeLogRepo::append(
        &tx,
        &NewChangeLogEntry {
            tenant_id: tenant_id.to_string(),
            table_name: table_name.to_string(),
            record_id,
            operation,
            old_data,
            new_data,
            changed_at,
            backup_job_id: None,
        },
    )?;

    tx.commit().map_err(from_rusqlite)?;
    Ok(sequence)
}
