//! Snapshot persistence

#![allow(clippy::result_large_err)]

use crate::convert::{core_err, from_json, from_millis, to_json, to_millis};
use crate::errors::{from_rusqlite, not_found, Result};
use crate::repo::rollbacks::NON_TERMINAL;
use chrono::{DateTime, Utc};
use pitr_core::model::SnapshotStatus;
use pitr_core::PitrSnapshot;
use rusqlite::{Connection, OptionalExtension, Row};

pub struct SnapshotRepo;

const SNAPSHOT_COLUMNS: &str = "id, tenant_id, name, created_by, affected_tables, snapshot_data,
     checksum, total_rows_count, status, is_rolled_back, rolled_back_by, created_at, expires_at,
     log_sequence";

struct RawSnapshot {
    id: String,
    tenant_id: String,
    name: String,
    created_by: String,
    affected_tables: String,
    snapshot_data: String,
    checksum: String,
    total_rows_count: i64,
    status: String,
    is_rolled_back: i64,
    rolled_back_by: Option<String>,
    created_at: i64,
    expires_at: i64,
    log_sequence: i64,
}

fn raw_from_row(row: &Row<'_>) -> rusqlite::Result<RawSnapshot> {
    Ok(RawSnapshot {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        created_by: row.get(3)?,
        affected_tables: row.get(4)?,
        snapshot_data: row.get(5)?,
        checksum: row.get(6)?,
        total_rows_count: row.get(7)?,
        status: row.get(8)?,
        is_rolled_back: row.get(9)?,
        rolled_back_by: row.get(10)?,
        created_at: row.get(11)?,
        expires_at: row.get(12)?,
        log_sequence: row.get(13)?,
    })
}

impl RawSnapshot {
    fn decode(self) -> Result<PitrSnapshot> {
        Ok(PitrSnapshot {
            id: self.id,
            tenant_id: self.tenant_id,
            name: self.name,
            created_by: self.created_by,
            affected_tables: from_json("read_snapshot", &self.affected_tables)?,
            snapshot_data: from_json("read_snapshot", &self.snapshot_data)?,
            checksum: self.checksum,
            total_rows_count: self.total_rows_count as u64,
            status: SnapshotStatus::parse(&self.status).map_err(core_err("read_snapshot"))?,
            is_rolled_back: self.is_rolled_back != 0,
            rolled_back_by: self.rolled_back_by,
            created_at: from_millis(self.created_at)?,
            expires_at: from_millis(self.expires_at)?,
            log_sequence: self.log_sequence,
        })
    }
}

impl SnapshotRepo {
    pub fn insert(conn: &Connection, snapshot: &PitrSnapshot) -> Result<()> {
        conn.execute(
            &format!(
                "INSERT INTO pitr_snapshots ({}) VALUES
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                SNAPSHOT_COLUMNS
            ),
            rusqlite::params![
                snapshot.id,
                snapshot.tenant_id,
                snapshot.name,
                snapshot.created_by,
                to_json("insert_snapshot", &snapshot.affected_tables)?,
                to_json("insert_snapshot", &snapshot.snapshot_data)?,
                snapshot.checksum,
                snapshot.total_rows_count as i64,
                snapshot.status.as_str(),
                snapshot.is_rolled_back as i64,
                snapshot.rolled_back_by,
                to_millis(snapshot.created_at),
                to_millis(snapshot.expires_at),
                snapshot.log_sequence,
            ],
        )
        .map_err(from_rusqlite)?;

        tracing::debug!(
            snapshot_id = %snapshot.id,
            tenant_id = %snapshot.tenant_id,
            total_rows = snapshot.total_rows_count,
            "Persisted snapshot"
        );
        Ok(())
    }

    pub fn find(conn: &Connection, snapshot_id: &str) -> Result<Option<PitrSnapshot>> {
        conn.query_row(
            &format!(
                "SELECT {} FROM pitr_snapshots WHERE id = ?1",
                SNAPSHOT_COLUMNS
            ),
            [snapshot_id],
            raw_from_row,
        )
        .optional()
        .map_err(from_rusqlite)?
        .map(RawSnapshot::decode)
        .transpose()
    }

    /// Fetch a snapshot that belongs to `tenant_id`.
    ///
    /// A snapshot of another tenant is reported as not found.
    pub fn get(conn: &Connection, tenant_id: &str, snapshot_id: &str) -> Result<PitrSnapshot> {
        Self::find(conn, snapshot_id)?
            .filter(|s| s.tenant_id == tenant_id)
            .ok_or_else(|| not_found("get_snapshot", snapshot_id, "snapshot"))
    }

    /// Snapshots of a tenant, newest first
    pub fn list_for_tenant(conn: &Connection, tenant_id: &str) -> Result<Vec<PitrSnapshot>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM pitr_snapshots WHERE tenant_id = ?1
                 ORDER BY created_at DESC, id DESC",
                SNAPSHOT_COLUMNS
            ))
            .map_err(from_rusqlite)?;
        let raw = stmt
            .query_map([tenant_id], raw_from_row)
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;
        raw.into_iter().map(RawSnapshot::decode).collect()
    }

    /// Mark a snapshot as consumed by `rollback_id`. Repeating the call for
    /// the same rollback is a no-op.
    pub fn mark_rolled_back(conn: &Connection, snapshot_id: &str, rollback_id: &str) -> Result<()> {
        let changed = conn
            .execute(
                "UPDATE pitr_snapshots
                 SET is_rolled_back = 1, status = 'rolled_back', rolled_back_by = ?2
                 WHERE id = ?1 AND (is_rolled_back = 0 OR rolled_back_by = ?2)",
                [snapshot_id, rollback_id],
            )
            .map_err(from_rusqlite)?;
        if changed == 0 && Self::find(conn, snapshot_id)?.is_none() {
            return Err(not_found("mark_rolled_back", snapshot_id, "snapshot"));
        }
        Ok(())
    }

    /// Delete expired snapshots that were never rolled back and that no
    /// in-flight rollback references.
    pub fn delete_expired(conn: &Connection, now: DateTime<Utc>) -> Result<u64> {
        let deleted = conn
            .execute(
                &format!(
                    "DELETE FROM pitr_snapshots
                     WHERE expires_at < ?1 AND is_rolled_back = 0
                       AND id NOT IN (SELECT snapshot_id FROM rollback_records WHERE {})",
                    NON_TERMINAL
                ),
                [to_millis(now)],
            )
            .map_err(from_rusqlite)?;
        Ok(deleted as u64)
    }
}
