//! PITR Store - SQLite persistence for the point-in-time recovery engine
//!
//! Provides:
//! - Connection setup and embedded, checksummed migrations
//! - The shared multi-tenant data plane (`managed_rows`) with foreign-key
//!   enforcement driven by constraint leases
//! - Repositories for schemas, change log, snapshots, leases, rollback
//!   records and backup jobs

pub mod convert;
pub mod db;
pub mod errors;
pub mod migrations;
pub mod repo;

// Re-export key types
pub use errors::Result;
pub use repo::{
    BackupRepo, ChangeLogCursor, ChangeLogQuery, ChangeLogRepo, LeaseRepo, RollbackRepo, RowRepo,
    SchemaRepo, SnapshotRepo,
};
