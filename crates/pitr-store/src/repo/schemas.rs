//! Schema registry and tenant grants

#![allow(clippy::result_large_err)]

use crate::convert::{from_json, to_json, to_millis};
use crate::errors::{from_rusqlite, Result};
use chrono::Utc;
use pitr_core::errors::{ExError, ExErrorKind};
use pitr_core::{SchemaRegistry, TableSchema};
use rusqlite::{Connection, OptionalExtension};

pub struct SchemaRepo;

impl SchemaRepo {
    /// Register (or replace) a managed table and its foreign-key rows.
    ///
    /// Fails with `ERR_CONCURRENCY` while any of the table's constraints is
    /// leased by a rollback.
    pub fn register_table(conn: &mut Connection, schema: &TableSchema) -> Result<()> {
        let mut registry = Self::load_registry(conn)?;
        registry
            .register(schema.clone())
            .map_err(|e| ExError::from(e).with_op("register_table"))?;

        let tx = conn.transaction().map_err(from_rusqlite)?;

        let leased: Option<String> = tx
            .query_row(
                "SELECT owner_rollback_id FROM fk_constraints
                 WHERE table_name = ?1 AND is_disabled = 1 LIMIT 1",
                [&schema.name],
                |row| row.get(0),
            )
            .optional()
            .map_err(from_rusqlite)?;
        if let Some(owner) = leased {
            return Err(ExError::new(ExErrorKind::Concurrency)
                .with_op("register_table")
                .with_table(schema.name.clone())
                .with_rollback_id(owner)
                .with_message("constraints are leased by an active rollback"));
        }

        let now = to_millis(Utc::now());
        tx.execute(
            "INSERT INTO table_schemas (table_name, schema_name, definition, registered_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(table_name) DO UPDATE SET
                schema_name = excluded.schema_name,
                definition = excluded.definition",
            rusqlite::params![
                schema.name,
                schema.schema_name,
                to_json("register_table", schema)?,
                now
            ],
        )
        .map_err(from_rusqlite)?;

        tx.execute(
            "DELETE FROM fk_constraints WHERE table_name = ?1",
            [&schema.name],
        )
        .map_err(from_rusqlite)?;

        for fk in &schema.foreign_keys {
            tx.execute(
                "INSERT INTO fk_constraints (
                    table_name, constraint_name, schema_name, definition,
                    column_name, references_table, references_column
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    schema.name,
                    fk.constraint_name,
                    schema.schema_name,
                    fk.definition(),
                    fk.column,
                    fk.references_table,
                    fk.references_column,
                ],
            )
            .map_err(from_rusqlite)?;
        }

        tx.commit().map_err(from_rusqlite)?;

        tracing::debug!(
            table_name = %schema.name,
            constraints = schema.foreign_keys.len(),
            "Registered managed table"
        );

        Ok(())
    }

    pub fn load_registry(conn: &Connection) -> Result<SchemaRegistry> {
        let mut stmt = conn
            .prepare("SELECT definition FROM table_schemas ORDER BY table_name")
            .map_err(from_rusqlite)?;
        let definitions = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;

        let schemas = definitions
            .iter()
            .map(|d| from_json::<TableSchema>("load_registry", d))
            .collect::<Result<Vec<_>>>()?;

        SchemaRegistry::from_schemas(schemas).map_err(|e| ExError::from(e).with_op("load_registry"))
    }

    /// Allow `tenant_id` to snapshot and roll back `table_name`.
    pub fn grant_table(conn: &Connection, tenant_id: &str, table_name: &str) -> Result<()> {
        let registered: bool = conn
            .query_row(
                "SELECT 1 FROM table_schemas WHERE table_name = ?1",
                [table_name],
                |_| Ok(true),
            )
            .optional()
            .map_err(from_rusqlite)?
            .unwrap_or(false);
        if !registered {
            return Err(ExError::new(ExErrorKind::Validation)
                .with_op("grant_table")
                .with_table(table_name.to_string())
                .with_message("table is not registered"));
        }

        conn.execute(
            "INSERT OR IGNORE INTO tenant_table_grants (tenant_id, table_name, granted_at)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![tenant_id, table_name, to_millis(Utc::now())],
        )
        .map_err(from_rusqlite)?;

        Ok(())
    }

    pub fn granted_tables(conn: &Connection, tenant_id: &str) -> Result<Vec<String>> {
        let mut stmt = conn
            .prepare(
                "SELECT table_name FROM tenant_table_grants
                 WHERE tenant_id = ?1 ORDER BY table_name",
            )
            .map_err(from_rusqlite)?;
        let tables = stmt
            .query_map([tenant_id], |row| row.get(0))
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<String>, _>>()
            .map_err(from_rusqlite)?;
        Ok(tables)
    }

    /// Reject any table outside the tenant's allowed set.
    pub fn ensure_granted(conn: &Connection, tenant_id: &str, tables: &[String]) -> Result<()> {
        let granted = Self::granted_tables(conn, tenant_id)?;
        if let Some(missing) = tables.iter().find(|t| !granted.contains(t)) {
            return Err(ExError::new(ExErrorKind::Validation)
                .with_op("ensure_granted")
                .with_table(missing.clone())
                .with_message(format!(
                    "table {} is not in the allowed set of tenant {}",
                    missing, tenant_id
                )));
        }
        Ok(())
    }
}
