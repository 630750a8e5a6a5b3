//! Backup job bookkeeping.
//!
//! Jobs are recorded by the backup subsystem; the engine only keeps their
//! chain and outcome so that statistics and restore planning have data.

#![allow(clippy::result_large_err)]

use chrono::Utc;
use pitr_core::errors::{ExError, ExErrorKind};
use pitr_core::{log_op_end, log_op_error, log_op_start};
use pitr_core::{BackupJob, BackupKind, BackupStatus};
use pitr_store::errors::Result;
use pitr_store::BackupRepo;
use rusqlite::Connection;

use super::{elapsed_ms, new_id};

/// Start a job in `running` state.
///
/// # Errors
///
/// `ERR_VALIDATION` if an incremental names no parent, a full backup names
/// one, or the parent belongs to another tenant.
pub fn record_backup_job(
    conn: &Connection,
    tenant_id: &str,
    kind: BackupKind,
    parent_backup_id: Option<&str>,
) -> Result<BackupJob> {
    log_op_start!("record_backup_job", tenant_id = tenant_id, kind = kind.as_str());
    let start = std::time::Instant::now();

    let result = (|| -> Result<BackupJob> {
        if tenant_id.trim().is_empty() {
            return Err(ExError::new(ExErrorKind::Validation)
                .with_op("record_backup_job")
                .with_message("tenant_id is required"));
        }
        let job = BackupJob {
            id: new_id(),
            tenant_id: tenant_id.to_string(),
            kind,
            status: BackupStatus::Running,
            size_bytes: 0,
            retry_count: 0,
            parent_backup_id: parent_backup_id.map(str::to_string),
            started_at: Utc::now(),
            completed_at: None,
            error_message: None,
        };
        BackupRepo::insert(conn, &job)?;
        Ok(job)
    })();

    match &result {
        Ok(job) => {
            log_op_end!(
                "record_backup_job",
                duration_ms = elapsed_ms(start),
                backup_id = %job.id
            );
        }
        Err(e) => {
            log_op_error!("record_backup_job", e.clone(), duration_ms = elapsed_ms(start));
        }
    }
    result
}

pub fn complete_backup_job(conn: &Connection, backup_id: &str, size_bytes: u64) -> Result<BackupJob> {
    tracing::debug!(backup_id, size_bytes, "Completing backup job");
    BackupRepo::complete(conn, backup_id, size_bytes, Utc::now())
}

/// Mark a job failed; each failure counts as one retry.
pub fn fail_backup_job(conn: &Connection, backup_id: &str, error_message: &str) -> Result<BackupJob> {
    tracing::debug!(backup_id, error_message, "Failing backup job");
    BackupRepo::fail(conn, backup_id, error_message, Utc::now())
}

/// Jobs from the base full backup up to `backup_id`.
pub fn get_backup_chain(conn: &Connection, backup_id: &str) -> Result<Vec<BackupJob>> {
    log_op_start!("get_backup_chain", backup_id = backup_id);
    let start = std::time::Instant::now();

    let chain = BackupRepo::chain(conn, backup_id).map_err(|e| {
        log_op_error!("get_backup_chain", e.clone(), duration_ms = elapsed_ms(start));
        e
    })?;

    log_op_end!(
        "get_backup_chain",
        duration_ms = elapsed_ms(start),
        length = chain.len()
    );
    Ok(chain)
}
