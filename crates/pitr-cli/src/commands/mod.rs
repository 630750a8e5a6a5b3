//! Subcommands of the `pitr` binary

pub mod backup;
pub mod cleanup;
pub mod init;
pub mod order;
pub mod rollback;
pub mod snapshot;
pub mod stats;

use chrono::{DateTime, Utc};
use pitr_core::EngineConfig;
use rusqlite::Connection;
use serde::Serialize;
use std::path::Path;

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Open database and loaded configuration shared by every subcommand
pub struct Context {
    pub conn: Connection,
    pub config: EngineConfig,
}

impl Context {
    pub fn open(db: &Path, config: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let config = EngineConfig::load(config)?;
        if let Some(parent) = db.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = pitr_engine::open_database(db, &config)?;
        Ok(Self { conn, config })
    }
}

/// Parse an RFC 3339 timestamp argument.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 timestamp {}: {}", s, e))
}

pub fn print_json<T: Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
