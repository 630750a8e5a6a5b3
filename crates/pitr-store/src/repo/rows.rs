//! The shared data plane: rows of every managed table for every tenant.
//!
//! Writes enforce the foreign-key constraints that are currently enabled:
//! a child's reference must resolve to a parent row of the same tenant, and
//! a parent row cannot be deleted while a child of its tenant points at it.
//! Constraints leased by a rollback are disabled and not enforced.

#![allow(clippy::result_large_err)]

use crate::convert::{from_json, to_json};
use crate::errors::{constraint_violation, from_rusqlite, not_found, Result};
use pitr_core::errors::{ExError, ExErrorKind};
use pitr_core::{TableSchema, TypedRow};
use rusqlite::{Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::time::Instant;

pub struct RowRepo;

struct EnabledConstraint {
    name: String,
    table_name: String,
    column: String,
    references_table: String,
}

impl RowRepo {
    /// Rows of one table for one tenant, in record-id order.
    pub fn list(conn: &Connection, tenant_id: &str, table_name: &str) -> Result<Vec<TypedRow>> {
        let mut stmt = conn
            .prepare(
                "SELECT row_json FROM managed_rows
                 WHERE table_name = ?1 AND tenant_id = ?2
                 ORDER BY record_id",
            )
            .map_err(from_rusqlite)?;
        let raw = stmt
            .query_map([table_name, tenant_id], |row| row.get::<_, String>(0))
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;
        raw.iter().map(|r| from_json("list_rows", r)).collect()
    }

    /// Rows for several tables, keyed by table name.
    pub fn list_tables(
        conn: &Connection,
        tenant_id: &str,
        tables: &[String],
    ) -> Result<BTreeMap<String, Vec<TypedRow>>> {
        tables
            .iter()
            .map(|t| Ok((t.clone(), Self::list(conn, tenant_id, t)?)))
            .collect()
    }

    pub fn get(
        conn: &Connection,
        tenant_id: &str,
        table_name: &str,
        record_id: &str,
    ) -> Result<Option<TypedRow>> {
        let raw: Option<String> = conn
            .query_row(
                "SELECT row_json FROM managed_rows
                 WHERE table_name = ?1 AND tenant_id = ?2 AND record_id = ?3",
                [table_name, tenant_id, record_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(from_rusqlite)?;
        raw.map(|r| from_json("get_row", &r)).transpose()
    }

    pub fn count(conn: &Connection, tenant_id: &str, table_name: &str) -> Result<u64> {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM managed_rows WHERE table_name = ?1 AND tenant_id = ?2",
                [table_name, tenant_id],
                |row| row.get(0),
            )
            .map_err(from_rusqlite)?;
        Ok(count as u64)
    }

    /// Insert a new row; returns its record id.
    pub fn insert(
        conn: &Connection,
        tenant_id: &str,
        schema: &TableSchema,
        row: &TypedRow,
    ) -> Result<String> {
        let record_id = validated_record_id(schema, row, "insert_row")?;
        if Self::get(conn, tenant_id, &schema.name, &record_id)?.is_some() {
            return Err(ExError::new(ExErrorKind::Validation)
                .with_op("insert_row")
                .with_table(schema.name.clone())
                .with_entity_id(record_id)
                .with_message("record already exists"));
        }
        check_references(conn, tenant_id, schema, &record_id, row)?;
        write_row(conn, tenant_id, &schema.name, &record_id, row)?;
        Ok(record_id)
    }

    /// Replace an existing row; returns the previous image.
    pub fn update(
        conn: &Connection,
        tenant_id: &str,
        schema: &TableSchema,
        row: &TypedRow,
    ) -> Result<(String, TypedRow)> {
        let record_id = validated_record_id(schema, row, "update_row")?;
        let old = Self::get(conn, tenant_id, &schema.name, &record_id)?
            .ok_or_else(|| not_found("update_row", &record_id, "row"))?;
        check_references(conn, tenant_id, schema, &record_id, row)?;
        write_row(conn, tenant_id, &schema.name, &record_id, row)?;
        Ok((record_id, old))
    }

    /// Delete a row; returns the removed image.
    pub fn delete(
        conn: &Connection,
        tenant_id: &str,
        schema: &TableSchema,
        record_id: &str,
    ) -> Result<TypedRow> {
        let old = Self::get(conn, tenant_id, &schema.name, record_id)?
            .ok_or_else(|| not_found("delete_row", record_id, "row"))?;
        check_not_referenced(conn, tenant_id, &schema.name, record_id)?;
        remove_row(conn, tenant_id, &schema.name, record_id)?;
        Ok(old)
    }

    /// Make the tenant's rows of one table equal to `rows`.
    ///
    /// Rows absent from `rows` are deleted, the rest are upserted. Returns
    /// the number of rows in the restored table. Call inside a transaction:
    /// an error leaves partial writes that only a rollback of that
    /// transaction undoes.
    pub fn replace_table(
        conn: &Connection,
        tenant_id: &str,
        schema: &TableSchema,
        rows: &[TypedRow],
        deadline: Option<Instant>,
    ) -> Result<u64> {
        let check_deadline = || -> Result<()> {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(ExError::new(ExErrorKind::Timeout)
                    .with_op("replace_table")
                    .with_table(schema.name.clone())
                    .with_message("table restore exceeded its time budget"));
            }
            Ok(())
        };
        check_deadline()?;

        let mut target = BTreeMap::new();
        for row in rows {
            let record_id = validated_record_id(schema, row, "replace_table")?;
            target.insert(record_id, row);
        }

        let current = current_record_ids(conn, tenant_id, &schema.name)?;
        for record_id in current.iter().filter(|id| !target.contains_key(*id)) {
            check_deadline()?;
            check_not_referenced(conn, tenant_id, &schema.name, record_id)?;
            remove_row(conn, tenant_id, &schema.name, record_id)?;
        }

        for (record_id, row) in &target {
            check_deadline()?;
            let unchanged = current.contains(record_id)
                && Self::get(conn, tenant_id, &schema.name, record_id)?.as_ref() == Some(*row);
            if unchanged {
                continue;
            }
            check_references(conn, tenant_id, schema, record_id, row)?;
            write_row(conn, tenant_id, &schema.name, record_id, row)?;
        }

        Ok(target.len() as u64)
    }
}

fn validated_record_id(schema: &TableSchema, row: &TypedRow, op: &str) -> Result<String> {
    schema
        .validate_row(row)
        .and_then(|_| schema.record_id(row))
        .map_err(|e| {
            ExError::from(e)
                .with_op(op.to_string())
                .with_table(schema.name.clone())
        })
}

fn current_record_ids(
    conn: &Connection,
    tenant_id: &str,
    table_name: &str,
) -> Result<std::collections::BTreeSet<String>> {
    let mut stmt = conn
        .prepare("SELECT record_id FROM managed_rows WHERE table_name = ?1 AND tenant_id = ?2")
        .map_err(from_rusqlite)?;
    let ids = stmt
        .query_map([table_name, tenant_id], |row| row.get(0))
        .map_err(from_rusqlite)?
        .collect::<std::result::Result<_, _>>()
        .map_err(from_rusqlite)?;
    Ok(ids)
}

fn write_row(
    conn: &Connection,
    tenant_id: &str,
    table_name: &str,
    record_id: &str,
    row: &TypedRow,
) -> Result<()> {
    conn.execute(
        "INSERT INTO managed_rows (table_name, tenant_id, record_id, row_json)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(table_name, tenant_id, record_id) DO UPDATE SET
            row_json = excluded.row_json",
        rusqlite::params![table_name, tenant_id, record_id, to_json("write_row", row)?],
    )
    .map_err(from_rusqlite)?;
    Ok(())
}

fn remove_row(conn: &Connection, tenant_id: &str, table_name: &str, record_id: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM managed_rows WHERE table_name = ?1 AND tenant_id = ?2 AND record_id = ?3",
        [table_name, tenant_id, record_id],
    )
    .map_err(from_rusqlite)?;
    Ok(())
}

/// JSON path of a column's scalar inside `row_json`
pub(crate) fn column_path(column: &str) -> String {
    format!("$.\"{}\".value", column)
}

fn enabled_constraints(conn: &Connection, sql: &str, table_name: &str) -> Result<Vec<EnabledConstraint>> {
    let mut stmt = conn.prepare(sql).map_err(from_rusqlite)?;
    let rows = stmt
        .query_map([table_name], |row| {
            Ok(EnabledConstraint {
                name: row.get(0)?,
                table_name: row.get(1)?,
                column: row.get(2)?,
                references_table: row.get(3)?,
            })
        })
        .map_err(from_rusqlite)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(from_rusqlite)?;
    Ok(rows)
}

/// Every non-null reference of `row` must resolve within the tenant.
fn check_references(
    conn: &Connection,
    tenant_id: &str,
    schema: &TableSchema,
    record_id: &str,
    row: &TypedRow,
) -> Result<()> {
    let constraints = enabled_constraints(
        conn,
        "SELECT constraint_name, table_name, column_name, references_table
         FROM fk_constraints WHERE table_name = ?1 AND is_disabled = 0",
        &schema.name,
    )?;

    for c in constraints {
        let Some(key) = row.get(&c.column).and_then(|v| v.as_key()) else {
            continue;
        };
        if c.references_table == schema.name && key == record_id {
            continue;
        }
        let exists: bool = conn
            .query_row(
                "SELECT 1 FROM managed_rows
                 WHERE table_name = ?1 AND tenant_id = ?2 AND record_id = ?3",
                [c.references_table.as_str(), tenant_id, key.as_str()],
                |_| Ok(true),
            )
            .optional()
            .map_err(from_rusqlite)?
            .unwrap_or(false);
        if !exists {
            return Err(constraint_violation(
                &schema.name,
                &c.name,
                format!(
                    "{}.{} = {} has no matching row in {}",
                    schema.name, c.column, key, c.references_table
                ),
            ));
        }
    }
    Ok(())
}

/// No row of the tenant may still reference `record_id`.
fn check_not_referenced(
    conn: &Connection,
    tenant_id: &str,
    table_name: &str,
    record_id: &str,
) -> Result<()> {
    let constraints = enabled_constraints(
        conn,
        "SELECT constraint_name, table_name, column_name, references_table
         FROM fk_constraints WHERE references_table = ?1 AND is_disabled = 0",
        table_name,
    )?;

    for c in constraints {
        let child: Option<String> = conn
            .query_row(
                "SELECT record_id FROM managed_rows
                 WHERE table_name = ?1 AND tenant_id = ?2
                   AND CAST(json_extract(row_json, ?3) AS TEXT) = ?4
                   AND NOT (table_name = ?5 AND record_id = ?4)
                 LIMIT 1",
                rusqlite::params![
                    c.table_name,
                    tenant_id,
                    column_path(&c.column),
                    record_id,
                    table_name
                ],
                |row| row.get(0),
            )
            .optional()
            .map_err(from_rusqlite)?;
        if let Some(child_id) = child {
            return Err(constraint_violation(
                table_name,
                &c.name,
                format!(
                    "{}/{} is still referenced by {}/{}",
                    table_name, record_id, c.table_name, child_id
                ),
            ));
        }
    }
    Ok(())
}
