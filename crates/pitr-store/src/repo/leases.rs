//! Foreign-key constraint leases.
//!
//! Constraints are schema-global, so disabling one for a rollback affects
//! every tenant sharing the physical table. Ownership is taken with a
//! compare-and-set on `owner_rollback_id`; a constraint already owned by
//! another rollback cannot be acquired.

#![allow(clippy::result_large_err)]

use super::rows::column_path;
use crate::convert::{opt_from_millis, to_millis};
use crate::errors::{from_rusqlite, Result};
use chrono::{DateTime, Utc};
use pitr_core::errors::{ExError, ExErrorKind};
use pitr_core::FkConstraintLease;
use rusqlite::{Connection, Row};

pub struct LeaseRepo;

/// A child row whose reference does not resolve after re-enable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanRow {
    pub constraint_name: String,
    pub table_name: String,
    pub tenant_id: String,
    pub record_id: String,
}

const LEASE_COLUMNS: &str = "constraint_name, table_name, schema_name, definition, is_disabled,
     owner_rollback_id, disabled_at, re_enabled_at";

fn lease_from_row(row: &Row<'_>) -> rusqlite::Result<(FkConstraintLease, Option<i64>, Option<i64>)> {
    Ok((
        FkConstraintLease {
            constraint_name: row.get(0)?,
            table_name: row.get(1)?,
            schema_name: row.get(2)?,
            definition: row.get(3)?,
            is_disabled: row.get::<_, i64>(4)? != 0,
            owner_rollback_id: row.get(5)?,
            disabled_at: None,
            re_enabled_at: None,
        },
        row.get(6)?,
        row.get(7)?,
    ))
}

fn query_leases(
    conn: &Connection,
    filter: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<FkConstraintLease>> {
    let sql = format!(
        "SELECT {} FROM fk_constraints WHERE {} ORDER BY table_name, constraint_name",
        LEASE_COLUMNS, filter
    );
    let mut stmt = conn.prepare(&sql).map_err(from_rusqlite)?;
    let raw = stmt
        .query_map(params, lease_from_row)
        .map_err(from_rusqlite)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(from_rusqlite)?;

    raw.into_iter()
        .map(|(mut lease, disabled_at, re_enabled_at)| {
            lease.disabled_at = opt_from_millis(disabled_at)?;
            lease.re_enabled_at = opt_from_millis(re_enabled_at)?;
            Ok(lease)
        })
        .collect()
}

impl LeaseRepo {
    /// Constraints declared on `table_name`
    pub fn list_for_table(conn: &Connection, table_name: &str) -> Result<Vec<FkConstraintLease>> {
        query_leases(conn, "table_name = ?1", &[&table_name])
    }

    /// Constraints currently disabled by `rollback_id`
    pub fn held_by(conn: &Connection, rollback_id: &str) -> Result<Vec<FkConstraintLease>> {
        query_leases(
            conn,
            "owner_rollback_id = ?1 AND is_disabled = 1",
            &[&rollback_id],
        )
    }

    /// Disable every constraint of `table_name` on behalf of `rollback_id`.
    ///
    /// Re-acquiring a lease the rollback already holds succeeds. Run inside
    /// an immediate transaction together with the other tables of the
    /// rollback so that acquisition is all-or-nothing.
    ///
    /// # Errors
    ///
    /// `ERR_CONCURRENCY` naming the holder when a constraint is owned by a
    /// different rollback.
    pub fn acquire(
        conn: &Connection,
        rollback_id: &str,
        table_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<FkConstraintLease>> {
        let constraints = Self::list_for_table(conn, table_name)?;

        for lease in &constraints {
            let changed = conn
                .execute(
                    "UPDATE fk_constraints
                     SET is_disabled = 1, owner_rollback_id = ?1, disabled_at = ?2,
                         re_enabled_at = NULL
                     WHERE table_name = ?3 AND constraint_name = ?4
                       AND (owner_rollback_id IS NULL OR owner_rollback_id = ?1)",
                    rusqlite::params![
                        rollback_id,
                        to_millis(now),
                        table_name,
                        lease.constraint_name
                    ],
                )
                .map_err(from_rusqlite)?;

            if changed == 0 {
                let holder = lease.owner_rollback_id.clone().unwrap_or_default();
                return Err(ExError::new(ExErrorKind::Concurrency)
                    .with_op("acquire_lease")
                    .with_table(table_name.to_string())
                    .with_entity_id(lease.constraint_name.clone())
                    .with_rollback_id(rollback_id.to_string())
                    .with_message(format!(
                        "constraint {} is leased by rollback {}",
                        lease.constraint_name, holder
                    )));
            }
        }

        let acquired = Self::list_for_table(conn, table_name)?;
        tracing::debug!(
            rollback_id,
            table_name,
            constraints = acquired.len(),
            "Disabled constraints"
        );
        Ok(acquired)
    }

    /// Re-enable the constraints of `table_name` owned by `rollback_id`.
    ///
    /// Returns the released leases as they were held, with `re_enabled_at`
    /// set and the owner kept for the audit trail.
    pub fn release(
        conn: &Connection,
        rollback_id: &str,
        table_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<FkConstraintLease>> {
        let owned = query_leases(
            conn,
            "table_name = ?1 AND owner_rollback_id = ?2",
            &[&table_name, &rollback_id],
        )?;

        conn.execute(
            "UPDATE fk_constraints
             SET is_disabled = 0, owner_rollback_id = NULL, re_enabled_at = ?1
             WHERE table_name = ?2 AND owner_rollback_id = ?3",
            rusqlite::params![to_millis(now), table_name, rollback_id],
        )
        .map_err(from_rusqlite)?;

        tracing::debug!(
            rollback_id,
            table_name,
            constraints = owned.len(),
            "Re-enabled constraints"
        );

        Ok(owned
            .into_iter()
            .map(|mut lease| {
                lease.is_disabled = false;
                lease.re_enabled_at = Some(now);
                lease
            })
            .collect())
    }

    /// Rows of any tenant violating an enabled constraint of `table_name`.
    pub fn orphans(conn: &Connection, table_name: &str) -> Result<Vec<OrphanRow>> {
        let mut stmt = conn
            .prepare(
                "SELECT constraint_name, column_name, references_table FROM fk_constraints
                 WHERE table_name = ?1 AND is_disabled = 0
                 ORDER BY constraint_name",
            )
            .map_err(from_rusqlite)?;
        let constraints = stmt
            .query_map([table_name], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;

        let mut orphans = Vec::new();
        for (constraint_name, column, references_table) in constraints {
            let mut stmt = conn
                .prepare(
                    "SELECT c.tenant_id, c.record_id FROM managed_rows c
                     WHERE c.table_name = ?1
                       AND json_extract(c.row_json, ?2) IS NOT NULL
                       AND NOT EXISTS (
                           SELECT 1 FROM managed_rows p
                           WHERE p.table_name = ?3
                             AND p.tenant_id = c.tenant_id
                             AND p.record_id = CAST(json_extract(c.row_json, ?2) AS TEXT)
                       )
                     ORDER BY c.tenant_id, c.record_id",
                )
                .map_err(from_rusqlite)?;
            let found = stmt
                .query_map(
                    rusqlite::params![table_name, column_path(&column), references_table],
                    |row| {
                        Ok(OrphanRow {
                            constraint_name: constraint_name.clone(),
                            table_name: table_name.to_string(),
                            tenant_id: row.get(0)?,
                            record_id: row.get(1)?,
                        })
                    },
                )
                .map_err(from_rusqlite)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(from_rusqlite)?;
            orphans.extend(found);
        }
        Ok(orphans)
    }
}
