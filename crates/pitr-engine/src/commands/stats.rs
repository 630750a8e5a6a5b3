//! Read-only statistics over the change log, backups and rollbacks.

#![allow(clippy::result_large_err)]

use chrono::{DateTime, Utc};
use pitr_core::stats::health_score as score;
use pitr_core::{log_op_end, log_op_error, log_op_start};
use pitr_core::{BackupStatistics, EngineConfig, PitrStats};
use pitr_store::errors::Result;
use pitr_store::{BackupRepo, ChangeLogQuery, ChangeLogRepo, RollbackRepo};
use rusqlite::Connection;

use super::elapsed_ms;

/// Change counts of a tenant over `(base_backup_timestamp, target_timestamp]`.
///
/// Without a base the window is open at the start.
pub fn calculate_stats(
    conn: &Connection,
    config: &EngineConfig,
    tenant_id: &str,
    target_timestamp: DateTime<Utc>,
    base_backup_timestamp: Option<DateTime<Utc>>,
) -> Result<PitrStats> {
    log_op_start!("calculate_stats", tenant_id = tenant_id);
    let start = std::time::Instant::now();

    let stats = window_stats(conn, config, tenant_id, target_timestamp, base_backup_timestamp)
        .map_err(|e| {
            log_op_error!("calculate_stats", e.clone(), duration_ms = elapsed_ms(start));
            e
        })?;

    log_op_end!(
        "calculate_stats",
        duration_ms = elapsed_ms(start),
        total_operations = stats.total_operations
    );
    Ok(stats)
}

/// Fold of every change the tenant made in `(base, target]`, across all of
/// its tables. Dry-run rollbacks report exactly this.
pub(crate) fn window_stats(
    conn: &Connection,
    config: &EngineConfig,
    tenant_id: &str,
    target: DateTime<Utc>,
    base: Option<DateTime<Utc>>,
) -> Result<PitrStats> {
    let mut query = ChangeLogQuery::new(tenant_id)
        .to(target)
        .page_size(config.changelog_page_size);
    if let Some(base) = base {
        query = query.from(base);
    }
    ChangeLogRepo::stats(conn, &query)
}

pub fn backup_statistics(conn: &Connection, tenant_id: &str) -> Result<BackupStatistics> {
    let jobs = BackupRepo::list_for_tenant(conn, tenant_id)?;
    Ok(BackupStatistics::from_jobs(&jobs))
}

/// Health of a tenant's recovery posture in `0..=100`.
pub fn health_score(conn: &Connection, tenant_id: &str) -> Result<u8> {
    health_score_at(conn, tenant_id, Utc::now())
}

pub fn health_score_at(conn: &Connection, tenant_id: &str, now: DateTime<Utc>) -> Result<u8> {
    let backups = backup_statistics(conn, tenant_id)?;
    let rollbacks = RollbackRepo::counts(conn, tenant_id)?;
    let value = score(&backups, rollbacks, now);
    tracing::debug!(tenant_id, health_score = value, "Computed health score");
    Ok(value)
}
