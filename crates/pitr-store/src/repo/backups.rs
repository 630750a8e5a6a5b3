//! Backup job bookkeeping and chains

#![allow(clippy::result_large_err)]

use crate::convert::{core_err, from_millis, opt_from_millis, to_millis};
use crate::errors::{from_rusqlite, not_found, Result};
use chrono::{DateTime, Utc};
use pitr_core::errors::{ExError, ExErrorKind};
use pitr_core::{BackupJob, BackupKind, BackupStatus};
use rusqlite::{Connection, OptionalExtension, Row};
use std::collections::HashSet;

pub struct BackupRepo;

const JOB_COLUMNS: &str = "id, tenant_id, kind, status, size_bytes, retry_count, parent_backup_id,
     started_at, completed_at, error_message";

struct RawJob {
    id: String,
    tenant_id: String,
    kind: String,
    status: String,
    size_bytes: i64,
    retry_count: i64,
    parent_backup_id: Option<String>,
    started_at: i64,
    completed_at: Option<i64>,
    error_message: Option<String>,
}

fn raw_from_row(row: &Row<'_>) -> rusqlite::Result<RawJob> {
    Ok(RawJob {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        kind: row.get(2)?,
        status: row.get(3)?,
        size_bytes: row.get(4)?,
        retry_count: row.get(5)?,
        parent_backup_id: row.get(6)?,
        started_at: row.get(7)?,
        completed_at: row.get(8)?,
        error_message: row.get(9)?,
    })
}

impl RawJob {
    fn decode(self) -> Result<BackupJob> {
        Ok(BackupJob {
            id: self.id,
            tenant_id: self.tenant_id,
            kind: BackupKind::parse(&self.kind).map_err(core_err("read_backup"))?,
            status: BackupStatus::parse(&self.status).map_err(core_err("read_backup"))?,
            size_bytes: self.size_bytes as u64,
            retry_count: self.retry_count as u32,
            parent_backup_id: self.parent_backup_id,
            started_at: from_millis(self.started_at)?,
            completed_at: opt_from_millis(self.completed_at)?,
            error_message: self.error_message,
        })
    }
}

impl BackupRepo {
    /// Record a new job.
    ///
    /// Incrementals must name an existing parent of the same tenant; full
    /// backups must not name one.
    pub fn insert(conn: &Connection, job: &BackupJob) -> Result<()> {
        match (job.kind, &job.parent_backup_id) {
            (BackupKind::Full, Some(_)) => {
                return Err(ExError::new(ExErrorKind::Validation)
                    .with_op("record_backup_job")
                    .with_entity_id(job.id.clone())
                    .with_message("full backup cannot have a parent"));
            }
            (BackupKind::Incremental, None) => {
                return Err(ExError::new(ExErrorKind::Validation)
                    .with_op("record_backup_job")
                    .with_entity_id(job.id.clone())
                    .with_message("incremental backup requires a parent"));
            }
            (BackupKind::Incremental, Some(parent_id)) => {
                let parent = Self::get(conn, parent_id)?;
                if parent.tenant_id != job.tenant_id {
                    return Err(ExError::new(ExErrorKind::Validation)
                        .with_op("record_backup_job")
                        .with_entity_id(job.id.clone())
                        .with_message("parent backup belongs to another tenant"));
                }
            }
            (BackupKind::Full, None) => {}
        }

        conn.execute(
            &format!(
                "INSERT INTO backup_jobs ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                JOB_COLUMNS
            ),
            rusqlite::params![
                job.id,
                job.tenant_id,
                job.kind.as_str(),
                job.status.as_str(),
                job.size_bytes as i64,
                i64::from(job.retry_count),
                job.parent_backup_id,
                to_millis(job.started_at),
                job.completed_at.map(to_millis),
                job.error_message,
            ],
        )
        .map_err(from_rusqlite)?;
        Ok(())
    }

    pub fn complete(
        conn: &Connection,
        backup_id: &str,
        size_bytes: u64,
        completed_at: DateTime<Utc>,
    ) -> Result<BackupJob> {
        let changed = conn
            .execute(
                "UPDATE backup_jobs
                 SET status = 'completed', size_bytes = ?2, completed_at = ?3, error_message = NULL
                 WHERE id = ?1",
                rusqlite::params![backup_id, size_bytes as i64, to_millis(completed_at)],
            )
            .map_err(from_rusqlite)?;
        if changed == 0 {
            return Err(not_found("complete_backup_job", backup_id, "backup job"));
        }
        Self::get(conn, backup_id)
    }

    /// Mark a job failed and count the attempt.
    pub fn fail(
        conn: &Connection,
        backup_id: &str,
        error_message: &str,
        failed_at: DateTime<Utc>,
    ) -> Result<BackupJob> {
        let changed = conn
            .execute(
                "UPDATE backup_jobs
                 SET status = 'failed', retry_count = retry_count + 1,
                     completed_at = ?3, error_message = ?2
                 WHERE id = ?1",
                rusqlite::params![backup_id, error_message, to_millis(failed_at)],
            )
            .map_err(from_rusqlite)?;
        if changed == 0 {
            return Err(not_found("fail_backup_job", backup_id, "backup job"));
        }
        Self::get(conn, backup_id)
    }

    pub fn get(conn: &Connection, backup_id: &str) -> Result<BackupJob> {
        conn.query_row(
            &format!("SELECT {} FROM backup_jobs WHERE id = ?1", JOB_COLUMNS),
            [backup_id],
            raw_from_row,
        )
        .optional()
        .map_err(from_rusqlite)?
        .ok_or_else(|| not_found("get_backup_job", backup_id, "backup job"))?
        .decode()
    }

    pub fn list_for_tenant(conn: &Connection, tenant_id: &str) -> Result<Vec<BackupJob>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM backup_jobs WHERE tenant_id = ?1 ORDER BY started_at, id",
                JOB_COLUMNS
            ))
            .map_err(from_rusqlite)?;
        let raw = stmt
            .query_map([tenant_id], raw_from_row)
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;
        raw.into_iter().map(RawJob::decode).collect()
    }

    /// Jobs from the base full backup to `backup_id`, base first.
    ///
    /// # Errors
    ///
    /// - `ERR_NOT_FOUND` if `backup_id` or a parent is missing
    /// - `ERR_VALIDATION` if the parent links loop
    pub fn chain(conn: &Connection, backup_id: &str) -> Result<Vec<BackupJob>> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(backup_id.to_string());

        while let Some(id) = next {
            if !visited.insert(id.clone()) {
                return Err(ExError::new(ExErrorKind::Validation)
                    .with_op("backup_chain")
                    .with_entity_id(backup_id.to_string())
                    .with_message(format!("backup chain loops at {}", id)));
            }
            let job = Self::get(conn, &id)?;
            next = job.parent_backup_id.clone();
            chain.push(job);
        }

        chain.reverse();
        Ok(chain)
    }
}
