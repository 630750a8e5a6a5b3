//! Engine-level read-only query surface.
//!
//! `apply_engine_query` takes a shared connection and never writes.

#![allow(clippy::result_large_err)]

use chrono::{DateTime, Utc};
use pitr_core::model::{RollbackSummary, SnapshotSummary};
use pitr_core::{
    BackupJob, BackupStatistics, EngineConfig, IntegrityReport, PitrSnapshot, PitrStats,
    RollbackRecord,
};
use pitr_store::errors::Result;
use rusqlite::Connection;

use crate::commands::backups::get_backup_chain;
use crate::commands::integrity::validate_integrity;
use crate::commands::rollback::{get_restoration_order, get_rollback, get_rollback_history};
use crate::commands::snapshot::{get_active_snapshots, get_snapshot};
use crate::commands::stats::{backup_statistics, calculate_stats, health_score};

/// Read-only queries supported by the engine.
#[derive(Debug, Clone)]
pub enum EngineQuery {
    GetSnapshot {
        tenant_id: String,
        snapshot_id: String,
    },
    ActiveSnapshots {
        tenant_id: String,
    },
    ValidateIntegrity {
        snapshot_id: String,
    },
    GetRollback {
        rollback_id: String,
    },
    /// `limit` falls back to the configured history limit
    RollbackHistory {
        tenant_id: String,
        limit: Option<usize>,
    },
    RestorationOrder {
        tables: Vec<String>,
    },
    CalculateStats {
        tenant_id: String,
        target_timestamp: DateTime<Utc>,
        base_backup_timestamp: Option<DateTime<Utc>>,
    },
    BackupStatistics {
        tenant_id: String,
    },
    HealthScore {
        tenant_id: String,
    },
    BackupChain {
        backup_id: String,
    },
}

/// Result of a read-only query.
#[derive(Debug, Clone)]
pub enum EngineQueryResult {
    Snapshot(Box<PitrSnapshot>),
    ActiveSnapshots(Vec<SnapshotSummary>),
    Integrity(IntegrityReport),
    Rollback(Box<RollbackRecord>),
    RollbackHistory(Vec<RollbackSummary>),
    RestorationOrder(Vec<String>),
    Stats(PitrStats),
    BackupStatistics(BackupStatistics),
    HealthScore(u8),
    BackupChain(Vec<BackupJob>),
}

pub fn apply_engine_query(
    query: EngineQuery,
    conn: &Connection,
    config: &EngineConfig,
) -> Result<EngineQueryResult> {
    match query {
        EngineQuery::GetSnapshot {
            tenant_id,
            snapshot_id,
        } => get_snapshot(conn, &tenant_id, &snapshot_id)
            .map(|s| EngineQueryResult::Snapshot(Box::new(s))),
        EngineQuery::ActiveSnapshots { tenant_id } => {
            get_active_snapshots(conn, &tenant_id).map(EngineQueryResult::ActiveSnapshots)
        }
        EngineQuery::ValidateIntegrity { snapshot_id } => {
            validate_integrity(conn, &snapshot_id).map(EngineQueryResult::Integrity)
        }
        EngineQuery::GetRollback { rollback_id } => get_rollback(conn, &rollback_id)
            .map(|r| EngineQueryResult::Rollback(Box::new(r))),
        EngineQuery::RollbackHistory { tenant_id, limit } => {
            get_rollback_history(conn, config, &tenant_id, limit)
                .map(EngineQueryResult::RollbackHistory)
        }
        EngineQuery::RestorationOrder { tables } => {
            get_restoration_order(conn, &tables).map(EngineQueryResult::RestorationOrder)
        }
        EngineQuery::CalculateStats {
            tenant_id,
            target_timestamp,
            base_backup_timestamp,
        } => calculate_stats(
            conn,
            config,
            &tenant_id,
            target_timestamp,
            base_backup_timestamp,
        )
        .map(EngineQueryResult::Stats),
        EngineQuery::BackupStatistics { tenant_id } => {
            backup_statistics(conn, &tenant_id).map(EngineQueryResult::BackupStatistics)
        }
        EngineQuery::HealthScore { tenant_id } => {
            health_score(conn, &tenant_id).map(EngineQueryResult::HealthScore)
        }
        EngineQuery::BackupChain { backup_id } => {
            get_backup_chain(conn, &backup_id).map(EngineQueryResult::BackupChain)
        }
    }
}
