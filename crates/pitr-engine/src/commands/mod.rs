//! Command orchestration layer.
//!
//! ## Logging Ownership
//!
//! Public operations here own lifecycle logging (`log_op_start!`,
//! `log_op_end!`, `log_op_error!`). The store and core layers only emit
//! `tracing::debug!` details.

pub mod backups;
pub mod constraints;
pub mod engine_command;
pub mod engine_query;
pub mod integrity;
pub mod retention;
pub mod rollback;
pub mod snapshot;
pub mod stats;
pub mod tables;

/// Milliseconds elapsed since `start`
pub(crate) fn elapsed_ms(start: std::time::Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// New time-ordered identifier
pub(crate) fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}
