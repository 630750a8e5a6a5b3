//! Engine-level action commands.

#![allow(clippy::result_large_err)]

use crate::commands::backups::{complete_backup_job, fail_backup_job, record_backup_job};
use crate::commands::retention::cleanup_expired_snapshots;
use crate::commands::rollback::{cancel_rollback, execute_rollback, RollbackOutcome, RollbackRequest};
use crate::commands::snapshot::{create_snapshot, SnapshotRequest};
use crate::commands::tables::{apply_tracked_write, grant_table, register_table, RowWrite};
use pitr_core::{BackupJob, BackupKind, EngineConfig, PitrStats, RollbackRecord, TableSchema};
use pitr_store::errors::Result;
use rusqlite::Connection;

/// Commands that write to the database.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    RegisterTable(TableSchema),
    GrantTable {
        tenant_id: String,
        table_name: String,
    },
    /// Row change plus change-log entry in one transaction.
    TrackedWrite {
        tenant_id: String,
        table_name: String,
        write: RowWrite,
    },
    CreateSnapshot(SnapshotRequest),
    ExecuteRollback {
        request: RollbackRequest,
        /// Validate and report the change window without writing.
        dry_run: bool,
    },
    /// Cancel a rollback still in `validating`.
    CancelRollback {
        rollback_id: String,
    },
    CleanupExpiredSnapshots,
    RecordBackupJob {
        tenant_id: String,
        kind: BackupKind,
        parent_backup_id: Option<String>,
    },
    CompleteBackupJob {
        backup_id: String,
        size_bytes: u64,
    },
    FailBackupJob {
        backup_id: String,
        error_message: String,
    },
}

/// Result of applying an engine command.
#[derive(Debug, Clone)]
pub enum EngineCommandResult {
    Done,
    /// Change-log sequence of the tracked write
    Written(i64),
    SnapshotCreated(String),
    RollbackFinished(RollbackRecord),
    RollbackDryRun(PitrStats),
    RollbackCancelled(RollbackRecord),
    SnapshotsDeleted(u64),
    BackupJob(BackupJob),
}

/// Apply an engine command.
pub fn apply_engine_command(
    cmd: EngineCommand,
    conn: &mut Connection,
    config: &EngineConfig,
) -> Result<EngineCommandResult> {
    match cmd {
        EngineCommand::RegisterTable(schema) => {
            register_table(conn, &schema)?;
            Ok(EngineCommandResult::Done)
        }
        EngineCommand::GrantTable {
            tenant_id,
            table_name,
        } => {
            grant_table(conn, &tenant_id, &table_name)?;
            Ok(EngineCommandResult::Done)
        }
        EngineCommand::TrackedWrite {
            tenant_id,
            table_name,
            write,
        } => apply_tracked_write(conn, &tenant_id, &table_name, write)
            .map(EngineCommandResult::Written),
        EngineCommand::CreateSnapshot(request) => {
            create_snapshot(conn, config, &request).map(EngineCommandResult::SnapshotCreated)
        }
        EngineCommand::ExecuteRollback { request, dry_run } => {
            match execute_rollback(conn, config, &request, dry_run)? {
                RollbackOutcome::Executed(record) => {
                    Ok(EngineCommandResult::RollbackFinished(record))
                }
                RollbackOutcome::DryRun(stats) => Ok(EngineCommandResult::RollbackDryRun(stats)),
            }
        }
        EngineCommand::CancelRollback { rollback_id } => {
            cancel_rollback(conn, &rollback_id).map(EngineCommandResult::RollbackCancelled)
        }
        EngineCommand::CleanupExpiredSnapshots => {
            cleanup_expired_snapshots(conn).map(EngineCommandResult::SnapshotsDeleted)
        }
        EngineCommand::RecordBackupJob {
            tenant_id,
            kind,
            parent_backup_id,
        } => record_backup_job(conn, &tenant_id, kind, parent_backup_id.as_deref())
            .map(EngineCommandResult::BackupJob),
        EngineCommand::CompleteBackupJob {
            backup_id,
            size_bytes,
        } => complete_backup_job(conn, &backup_id, size_bytes).map(EngineCommandResult::BackupJob),
        EngineCommand::FailBackupJob {
            backup_id,
            error_message,
        } => fail_backup_job(conn, &backup_id, &error_message).map(EngineCommandResult::BackupJob),
    }
}
