//! Integrity validation of a snapshot against the tenant's current rows.

#![allow(clippy::result_large_err)]

use pitr_core::checksum::compute_payload_checksum;
use pitr_core::integrity::compare_payloads;
use pitr_core::{log_op_end, log_op_error, log_op_start};
use pitr_core::IntegrityReport;
use pitr_store::convert::core_err;
use pitr_store::errors::{not_found, Result};
use pitr_store::{RowRepo, SnapshotRepo};
use rusqlite::Connection;

use super::elapsed_ms;

/// Compare the snapshot's tables with the owning tenant's current rows.
///
/// Also re-checks the snapshot itself: a payload whose checksum or row
/// count no longer matches what was recorded at capture is reported as an
/// issue. Read-only.
///
/// # Errors
///
/// `ERR_NOT_FOUND` for an unknown snapshot.
pub fn validate_integrity(conn: &Connection, snapshot_id: &str) -> Result<IntegrityReport> {
    log_op_start!("validate_integrity", snapshot_id = snapshot_id);
    let start = std::time::Instant::now();

    let report = validate_integrity_impl(conn, snapshot_id).map_err(|e| {
        log_op_error!(
            "validate_integrity",
            e.clone(),
            duration_ms = elapsed_ms(start)
        );
        e
    })?;

    log_op_end!(
        "validate_integrity",
        duration_ms = elapsed_ms(start),
        valid = report.valid,
        issues = report.issues.len()
    );
    Ok(report)
}

fn validate_integrity_impl(conn: &Connection, snapshot_id: &str) -> Result<IntegrityReport> {
    let snapshot = SnapshotRepo::find(conn, snapshot_id)?
        .ok_or_else(|| not_found("validate_integrity", snapshot_id, "snapshot"))?;

    let current = RowRepo::list_tables(conn, &snapshot.tenant_id, &snapshot.affected_tables)?;
    let mut report =
        compare_payloads(&snapshot.snapshot_data, &current).map_err(core_err("validate_integrity"))?;

    let recomputed =
        compute_payload_checksum(&snapshot.snapshot_data).map_err(core_err("validate_integrity"))?;
    if recomputed != snapshot.checksum {
        report = report.with_issue(format!(
            "snapshot payload checksum {} does not match recorded {}",
            recomputed, snapshot.checksum
        ));
    }
    if snapshot.payload_rows() != snapshot.total_rows_count {
        report = report.with_issue(format!(
            "snapshot payload holds {} rows, recorded {}",
            snapshot.payload_rows(),
            snapshot.total_rows_count
        ));
    }

    Ok(report)
}
