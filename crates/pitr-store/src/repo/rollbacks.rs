//! Rollback records

#![allow(clippy::result_large_err)]

use crate::convert::{core_err, from_json, from_millis, opt_from_millis, to_json, to_millis};
use crate::errors::{from_rusqlite, not_found, Result};
use pitr_core::stats::RollbackCounts;
use pitr_core::{RollbackRecord, RollbackStatus};
use rusqlite::{Connection, OptionalExtension, Row};
use std::collections::BTreeSet;

pub struct RollbackRepo;

const RECORD_COLUMNS: &str = "id, tenant_id, snapshot_id, initiated_by, reason, target_timestamp,
     status, tables_affected, tables_restored, rows_restored, errors_encountered,
     fk_constraints_handled, restoration_steps, current_step, integrity_valid, started_at,
     completed_at";

/// Rollbacks still owning their snapshot and leases
pub(crate) const NON_TERMINAL: &str = "status NOT IN ('completed', 'failed')";

struct RawRecord {
    id: String,
    tenant_id: String,
    snapshot_id: String,
    initiated_by: String,
    reason: String,
    target_timestamp: Option<i64>,
    status: String,
    tables_affected: String,
    tables_restored: String,
    rows_restored: i64,
    errors_encountered: String,
    fk_constraints_handled: String,
    restoration_steps: String,
    current_step: Option<String>,
    integrity_valid: Option<i64>,
    started_at: i64,
    completed_at: Option<i64>,
}

fn raw_from_row(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok(RawRecord {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        snapshot_id: row.get(2)?,
        initiated_by: row.get(3)?,
        reason: row.get(4)?,
        target_timestamp: row.get(5)?,
        status: row.get(6)?,
        tables_affected: row.get(7)?,
        tables_restored: row.get(8)?,
        rows_restored: row.get(9)?,
        errors_encountered: row.get(10)?,
        fk_constraints_handled: row.get(11)?,
        restoration_steps: row.get(12)?,
        current_step: row.get(13)?,
        integrity_valid: row.get(14)?,
        started_at: row.get(15)?,
        completed_at: row.get(16)?,
    })
}

impl RawRecord {
    fn decode(self) -> Result<RollbackRecord> {
        const OP: &str = "read_rollback";
        Ok(RollbackRecord {
            id: self.id,
            tenant_id: self.tenant_id,
            snapshot_id: self.snapshot_id,
            initiated_by: self.initiated_by,
            reason: self.reason,
            target_timestamp: opt_from_millis(self.target_timestamp)?,
            status: RollbackStatus::parse(&self.status).map_err(core_err(OP))?,
            tables_affected: from_json(OP, &self.tables_affected)?,
            tables_restored: from_json(OP, &self.tables_restored)?,
            rows_restored: self.rows_restored as u64,
            errors_encountered: from_json(OP, &self.errors_encountered)?,
            fk_constraints_handled: from_json(OP, &self.fk_constraints_handled)?,
            restoration_steps: from_json(OP, &self.restoration_steps)?,
            current_step: self.current_step,
            integrity_valid: self.integrity_valid.map(|v| v != 0),
            started_at: from_millis(self.started_at)?,
            completed_at: opt_from_millis(self.completed_at)?,
        })
    }
}

impl RollbackRepo {
    /// Insert a new record or overwrite the stored one with the same id.
    pub fn save(conn: &Connection, record: &RollbackRecord) -> Result<()> {
        const OP: &str = "save_rollback";
        conn.execute(
            &format!(
                "INSERT INTO rollback_records ({}) VALUES
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                 ON CONFLICT(id) DO UPDATE SET
                    status = excluded.status,
                    tables_affected = excluded.tables_affected,
                    tables_restored = excluded.tables_restored,
                    rows_restored = excluded.rows_restored,
                    errors_encountered = excluded.errors_encountered,
                    fk_constraints_handled = excluded.fk_constraints_handled,
                    restoration_steps = excluded.restoration_steps,
                    current_step = excluded.current_step,
                    integrity_valid = excluded.integrity_valid,
                    completed_at = excluded.completed_at",
                RECORD_COLUMNS
            ),
            rusqlite::params![
                record.id,
                record.tenant_id,
                record.snapshot_id,
                record.initiated_by,
                record.reason,
                record.target_timestamp.map(to_millis),
                record.status.as_str(),
                to_json(OP, &record.tables_affected)?,
                to_json(OP, &record.tables_restored)?,
                record.rows_restored as i64,
                to_json(OP, &record.errors_encountered)?,
                to_json(OP, &record.fk_constraints_handled)?,
                to_json(OP, &record.restoration_steps)?,
                record.current_step,
                record.integrity_valid.map(i64::from),
                to_millis(record.started_at),
                record.completed_at.map(to_millis),
            ],
        )
        .map_err(from_rusqlite)?;

        tracing::debug!(
            rollback_id = %record.id,
            status = %record.status,
            "Saved rollback record"
        );
        Ok(())
    }

    /// Save `record` only if the stored status is still `expected`.
    ///
    /// The status moves first with a compare-and-set; whoever loses the race
    /// gets `false` and writes nothing.
    pub fn save_if_status(
        conn: &Connection,
        record: &RollbackRecord,
        expected: RollbackStatus,
    ) -> Result<bool> {
        let changed = conn
            .execute(
                "UPDATE rollback_records SET status = ?3 WHERE id = ?1 AND status = ?2",
                rusqlite::params![record.id, expected.as_str(), record.status.as_str()],
            )
            .map_err(from_rusqlite)?;
        if changed == 0 {
            tracing::debug!(
                rollback_id = %record.id,
                expected = %expected,
                "Rollback record moved on, not saved"
            );
            return Ok(false);
        }
        Self::save(conn, record)?;
        Ok(true)
    }

    pub fn find(conn: &Connection, rollback_id: &str) -> Result<Option<RollbackRecord>> {
        conn.query_row(
            &format!(
                "SELECT {} FROM rollback_records WHERE id = ?1",
                RECORD_COLUMNS
            ),
            [rollback_id],
            raw_from_row,
        )
        .optional()
        .map_err(from_rusqlite)?
        .map(RawRecord::decode)
        .transpose()
    }

    pub fn get(conn: &Connection, rollback_id: &str) -> Result<RollbackRecord> {
        Self::find(conn, rollback_id)?
            .ok_or_else(|| not_found("get_rollback", rollback_id, "rollback record"))
    }

    /// Most recent records of a tenant, newest first
    pub fn history(conn: &Connection, tenant_id: &str, limit: usize) -> Result<Vec<RollbackRecord>> {
        Self::query(
            conn,
            &format!(
                "SELECT {} FROM rollback_records WHERE tenant_id = ?1
                 ORDER BY started_at DESC, id DESC LIMIT ?2",
                RECORD_COLUMNS
            ),
            rusqlite::params![tenant_id, limit as i64],
        )
    }

    /// Non-terminal records other than `exclude_id`
    pub fn in_flight(conn: &Connection, exclude_id: &str) -> Result<Vec<RollbackRecord>> {
        Self::query(
            conn,
            &format!(
                "SELECT {} FROM rollback_records WHERE {} AND id != ?1",
                RECORD_COLUMNS, NON_TERMINAL
            ),
            [exclude_id],
        )
    }

    /// First in-flight record (other than `exclude_id`) that uses the same
    /// snapshot or any of `tables`.
    pub fn find_conflicting(
        conn: &Connection,
        exclude_id: &str,
        snapshot_id: &str,
        tables: &[String],
    ) -> Result<Option<RollbackRecord>> {
        let wanted: BTreeSet<&String> = tables.iter().collect();
        Ok(Self::in_flight(conn, exclude_id)?.into_iter().find(|r| {
            r.snapshot_id == snapshot_id || r.tables_affected.iter().any(|t| wanted.contains(t))
        }))
    }

    /// Completed and failed counts for a tenant
    pub fn counts(conn: &Connection, tenant_id: &str) -> Result<RollbackCounts> {
        conn.query_row(
            "SELECT
                COALESCE(SUM(status = 'completed'), 0),
                COALESCE(SUM(status = 'failed'), 0)
             FROM rollback_records WHERE tenant_id = ?1",
            [tenant_id],
            |row| {
                Ok(RollbackCounts {
                    completed: row.get::<_, i64>(0)? as u64,
                    failed: row.get::<_, i64>(1)? as u64,
                })
            },
        )
        .map_err(from_rusqlite)
    }

    fn query<P: rusqlite::Params>(
        conn: &Connection,
        sql: &str,
        params: P,
    ) -> Result<Vec<RollbackRecord>> {
        let mut stmt = conn.prepare(sql).map_err(from_rusqlite)?;
        let raw = stmt
            .query_map(params, raw_from_row)
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;
        raw.into_iter().map(RawRecord::decode).collect()
    }
}
