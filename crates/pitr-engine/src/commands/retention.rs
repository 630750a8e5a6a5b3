//! Snapshot retention.

#![allow(clippy::result_large_err)]

use chrono::{DateTime, Utc};
use pitr_core::{log_op_end, log_op_error, log_op_start};
use pitr_store::errors::Result;
use pitr_store::SnapshotRepo;
use rusqlite::Connection;

use super::elapsed_ms;

/// Delete snapshots past `expires_at` that were never rolled back.
///
/// Returns the number deleted.
pub fn cleanup_expired_snapshots(conn: &Connection) -> Result<u64> {
    cleanup_expired_snapshots_at(conn, Utc::now())
}

/// Same as `cleanup_expired_snapshots` with an explicit clock.
pub fn cleanup_expired_snapshots_at(conn: &Connection, now: DateTime<Utc>) -> Result<u64> {
    log_op_start!("cleanup_expired_snapshots");
    let start = std::time::Instant::now();

    let deleted = SnapshotRepo::delete_expired(conn, now).map_err(|e| {
        log_op_error!(
            "cleanup_expired_snapshots",
            e.clone(),
            duration_ms = elapsed_ms(start)
        );
        e
    })?;

    log_op_end!(
        "cleanup_expired_snapshots",
        duration_ms = elapsed_ms(start),
        deleted = deleted
    );
    Ok(deleted)
}
