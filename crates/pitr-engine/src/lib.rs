//! PITR Engine - Orchestration layer
//!
//! Coordinates the pure core and the SQLite store into the operations of the
//! point-in-time recovery engine: snapshots, rollbacks, integrity checks,
//! retention, statistics and the background rollback worker.

pub mod commands;
pub mod worker;

use pitr_core::EngineConfig;
use pitr_store::errors::Result;
use rusqlite::Connection;
use std::path::Path;

pub use commands::engine_command::{apply_engine_command, EngineCommand, EngineCommandResult};
pub use commands::engine_query::{apply_engine_query, EngineQuery, EngineQueryResult};
pub use commands::rollback::{PreparedRollback, RollbackOutcome, RollbackRequest};
pub use worker::RollbackWorker;

/// Open, configure and migrate the database at `path`.
pub fn open_database<P: AsRef<Path>>(path: P, config: &EngineConfig) -> Result<Connection> {
    let mut conn = pitr_store::db::open(path)?;
    pitr_store::db::configure(&conn, config.busy_timeout())?;
    pitr_store::migrations::apply_migrations(&mut conn)?;
    Ok(conn)
}
