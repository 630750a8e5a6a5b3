//! Constraint controller: foreign-key leases held by a rollback.
//!
//! Acquisition for all tables of a rollback happens in one immediate
//! transaction, so a rollback either holds every lease it needs or none.
//! Release is attempted table by table and never stops at the first
//! failure.

#![allow(clippy::result_large_err)]

use chrono::Utc;
use pitr_core::errors::{ExError, ExErrorKind};
use pitr_core::FkConstraintLease;
use pitr_store::errors::{from_rusqlite, Result};
use pitr_store::repo::OrphanRow;
use pitr_store::LeaseRepo;
use rusqlite::{Connection, TransactionBehavior};

/// Disable the constraints of one table on behalf of `rollback_id`.
///
/// Returns the leases now held.
pub fn disable(
    conn: &Connection,
    rollback_id: &str,
    table_name: &str,
) -> Result<Vec<FkConstraintLease>> {
    LeaseRepo::acquire(conn, rollback_id, table_name, Utc::now())
}

/// Re-enable the constraints of one table owned by `rollback_id`.
///
/// Returns the released leases with `re_enabled_at` set.
pub fn reenable(
    conn: &Connection,
    rollback_id: &str,
    table_name: &str,
) -> Result<Vec<FkConstraintLease>> {
    LeaseRepo::release(conn, rollback_id, table_name, Utc::now()).map_err(|e| {
        ExError::new(ExErrorKind::Constraint)
            .with_op("reenable_constraints")
            .with_table(table_name.to_string())
            .with_rollback_id(rollback_id.to_string())
            .with_message("failed to re-enable constraints")
            .with_source(e)
    })
}

/// Disable the constraints of every table, all or nothing.
///
/// # Errors
///
/// `ERR_CONCURRENCY` if any constraint is leased by another rollback; no
/// lease is taken in that case.
pub fn disable_all(
    conn: &mut Connection,
    rollback_id: &str,
    tables: &[String],
) -> Result<Vec<FkConstraintLease>> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(from_rusqlite)?;

    let mut leases = Vec::new();
    for table in tables {
        leases.extend(disable(&tx, rollback_id, table)?);
    }

    tx.commit().map_err(from_rusqlite)?;
    Ok(leases)
}

/// Outcome of releasing every lease of a rollback
#[derive(Debug, Default)]
pub struct ReleaseReport {
    pub released: Vec<FkConstraintLease>,
    pub errors: Vec<ExError>,
}

/// Re-enable the constraints of every table, continuing past failures.
pub fn reenable_all(conn: &Connection, rollback_id: &str, tables: &[String]) -> ReleaseReport {
    let mut report = ReleaseReport::default();
    for table in tables {
        match reenable(conn, rollback_id, table) {
            Ok(released) => report.released.extend(released),
            Err(e) => {
                tracing::warn!(rollback_id, table_name = %table, error = %e, "Re-enable failed");
                report.errors.push(e);
            }
        }
    }
    report
}

/// Rows of `tenant_id` that violate a re-enabled constraint of `tables`.
pub fn find_violations(
    conn: &Connection,
    tenant_id: &str,
    tables: &[String],
) -> Result<Vec<OrphanRow>> {
    let mut violations = Vec::new();
    for table in tables {
        violations.extend(
            LeaseRepo::orphans(conn, table)?
                .into_iter()
                .filter(|o| o.tenant_id == tenant_id),
        );
    }
    Ok(violations)
}

/// Convert a violation into the error recorded on the rollback.
pub fn violation_error(rollback_id: &str, orphan: &OrphanRow) -> ExError {
    ExError::new(ExErrorKind::Constraint)
        .with_op("revalidate_constraints")
        .with_table(orphan.table_name.clone())
        .with_entity_id(orphan.record_id.clone())
        .with_rollback_id(rollback_id.to_string())
        .with_message(format!(
            "row {} violates {} after re-enable",
            orphan.record_id, orphan.constraint_name
        ))
}
