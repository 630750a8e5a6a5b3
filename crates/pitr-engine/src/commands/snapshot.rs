//! Snapshot capture and listing.
//!
//! ## Capture pipeline (in order):
//! 1. Normalize the table list (sorted, de-duplicated, non-empty)
//! 2. Reject tables outside the tenant's allowed set
//! 3. Read the tenant's rows and the change-log watermark in one
//!    transaction
//! 4. Validate every row against the schema registry
//! 5. Checksum the canonical payload and persist

#![allow(clippy::result_large_err)]

use chrono::{DateTime, Utc};
use pitr_core::checksum::compute_payload_checksum;
use pitr_core::errors::{ExError, ExErrorKind};
use pitr_core::model::{SnapshotStatus, SnapshotSummary};
use pitr_core::{log_op_end, log_op_error, log_op_start};
use pitr_core::{EngineConfig, PitrSnapshot};
use pitr_store::convert::core_err;
use pitr_store::errors::{from_rusqlite, Result};
use pitr_store::{ChangeLogRepo, RowRepo, SchemaRepo, SnapshotRepo};
use rusqlite::{Connection, TransactionBehavior};

use super::{elapsed_ms, new_id};

/// Parameters of a snapshot capture.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRequest {
    pub tenant_id: String,
    pub tables: Vec<String>,
    pub created_by: String,
    pub name: String,
    /// Overrides `created_at + snapshot_ttl_hours`
    pub expires_at: Option<DateTime<Utc>>,
}

impl SnapshotRequest {
    pub fn new(
        tenant_id: impl Into<String>,
        tables: &[&str],
        created_by: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            tables: tables.iter().map(|t| t.to_string()).collect(),
            created_by: created_by.into(),
            name: name.into(),
            expires_at: None,
        }
    }

    pub fn expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

/// Capture the tenant's current rows for the requested tables.
///
/// Returns the new snapshot id.
///
/// # Errors
///
/// - `ERR_VALIDATION` for an empty tenant or table list, a table outside
///   the tenant's allowed set, or a stored row that no longer matches its
///   schema
pub fn create_snapshot(
    conn: &mut Connection,
    config: &EngineConfig,
    request: &SnapshotRequest,
) -> Result<String> {
    log_op_start!(
        "create_snapshot",
        tenant_id = %request.tenant_id,
        tables = request.tables.len()
    );
    let start = std::time::Instant::now();

    let snapshot = create_snapshot_impl(conn, config, request).map_err(|e| {
        log_op_error!("create_snapshot", e.clone(), duration_ms = elapsed_ms(start));
        e
    })?;

    log_op_end!(
        "create_snapshot",
        duration_ms = elapsed_ms(start),
        snapshot_id = %snapshot.id,
        total_rows = snapshot.total_rows_count
    );
    Ok(snapshot.id)
}

fn create_snapshot_impl(
    conn: &mut Connection,
    config: &EngineConfig,
    request: &SnapshotRequest,
) -> Result<PitrSnapshot> {
    let invalid = |message: &str| {
        ExError::new(ExErrorKind::Validation)
            .with_op("create_snapshot")
            .with_message(message.to_string())
    };
    if request.tenant_id.trim().is_empty() {
        return Err(invalid("tenant_id is required"));
    }
    if request.created_by.trim().is_empty() {
        return Err(invalid("created_by is required"));
    }

    let mut tables = request.tables.clone();
    tables.sort();
    tables.dedup();
    if tables.is_empty() {
        return Err(invalid("at least one table is required"));
    }

    // Rows and watermark are read under the write lock so no change slips between them
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(from_rusqlite)?;

    SchemaRepo::ensure_granted(&tx, &request.tenant_id, &tables)?;
    let registry = SchemaRepo::load_registry(&tx)?;

    let payload = RowRepo::list_tables(&tx, &request.tenant_id, &tables)?;
    for (table, rows) in &payload {
        let schema = registry.get(table).map_err(core_err("create_snapshot"))?;
        for row in rows {
            schema.validate_row(row).map_err(|e| {
                ExError::from(e)
                    .with_op("create_snapshot")
                    .with_table(table.clone())
            })?;
        }
    }
    let log_sequence = ChangeLogRepo::max_sequence(&tx)?;

    let checksum = compute_payload_checksum(&payload).map_err(core_err("create_snapshot"))?;
    let created_at = Utc::now();
    let total_rows_count = payload.values().map(|rows| rows.len() as u64).sum();

    let snapshot = PitrSnapshot {
        id: new_id(),
        tenant_id: request.tenant_id.clone(),
        name: request.name.clone(),
        created_by: request.created_by.clone(),
        affected_tables: tables,
        snapshot_data: payload,
        checksum,
        total_rows_count,
        status: SnapshotStatus::Active,
        is_rolled_back: false,
        rolled_back_by: None,
        created_at,
        expires_at: request
            .expires_at
            .unwrap_or_else(|| created_at + config.snapshot_ttl()),
        log_sequence,
    };

    SnapshotRepo::insert(&tx, &snapshot)?;
    tx.commit().map_err(from_rusqlite)?;

    Ok(snapshot)
}

/// Fetch a snapshot of `tenant_id`.
///
/// # Errors
///
/// `ERR_NOT_FOUND` if the snapshot is absent or belongs to another tenant.
pub fn get_snapshot(conn: &Connection, tenant_id: &str, snapshot_id: &str) -> Result<PitrSnapshot> {
    SnapshotRepo::get(conn, tenant_id, snapshot_id)
}

/// Snapshots of a tenant that have not been consumed by a rollback,
/// newest first. Expired ones awaiting cleanup are listed with
/// `can_rollback = false`.
pub fn get_active_snapshots(conn: &Connection, tenant_id: &str) -> Result<Vec<SnapshotSummary>> {
    log_op_start!("get_active_snapshots", tenant_id = tenant_id);
    let start = std::time::Instant::now();

    let snapshots = SnapshotRepo::list_for_tenant(conn, tenant_id).map_err(|e| {
        log_op_error!(
            "get_active_snapshots",
            e.clone(),
            duration_ms = elapsed_ms(start)
        );
        e
    })?;

    let now = Utc::now();
    let active: Vec<SnapshotSummary> = snapshots
        .iter()
        .filter(|s| s.status == SnapshotStatus::Active && !s.is_rolled_back)
        .map(|s| s.summary(now))
        .collect();

    log_op_end!(
        "get_active_snapshots",
        duration_ms = elapsed_ms(start),
        count = active.len()
    );
    Ok(active)
}
