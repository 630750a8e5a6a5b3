//! Repositories over the PITR tables
//!
//! Every repository is a unit struct of associated functions taking a
//! `&Connection`. A `rusqlite::Transaction` derefs to `Connection`, so the
//! same functions run inside a caller's transaction.

mod backups;
mod changelog;
mod leases;
mod rollbacks;
mod rows;
mod schemas;
mod snapshots;

pub use backups::BackupRepo;
pub use changelog::{ChangeLogCursor, ChangeLogQuery, ChangeLogRepo};
pub use leases::{LeaseRepo, OrphanRow};
pub use rollbacks::RollbackRepo;
pub use rows::RowRepo;
pub use schemas::SchemaRepo;
pub use snapshots::SnapshotRepo;
