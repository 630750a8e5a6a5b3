//! PITR Core - Pure domain kernel of the point-in-time recovery engine
//!
//! This crate holds everything that does not touch storage:
//! - Error facility (`ExError`) and the core error taxonomy (`PitrError`)
//! - Structured logging facility and operation macros
//! - Typed rows and the per-table schema registry
//! - Restoration planning over foreign-key dependencies
//! - Canonical checksums, change-log replay, integrity comparison
//! - Statistics folding and engine configuration

pub mod checksum;
pub mod config;
pub mod errors;
pub mod integrity;
pub mod logging_facility;
pub mod model;
pub mod planner;
pub mod replay;
pub mod stats;

#[doc(hidden)]
pub use pitr_core_types;

// Re-export commonly used types
pub use config::EngineConfig;
pub use errors::{ExError, ExErrorKind, PitrError, Result};
pub use model::{
    BackupJob, BackupKind, BackupStatus, ChangeLogEntry, ChangeOperation, ColumnDef, ColumnType,
    FkConstraintLease, ForeignKeyDef, NewChangeLogEntry, PitrSnapshot, RestorationStep,
    RollbackError, RollbackRecord, RollbackStatus, SchemaRegistry, TableSchema, TypedRow, Value,
};
pub use integrity::IntegrityReport;
pub use stats::{BackupStatistics, PitrStats, RollbackCounts};
