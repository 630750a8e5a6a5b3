//! Statistics commands
//!
//! Usage:
//!   pitr stats changes --tenant <T> [--target <TS>] [--base <TS>]
//!   pitr stats backups --tenant <T>

use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use pitr_engine::commands::stats::{backup_statistics, calculate_stats, health_score};
use serde::Serialize;

use super::{parse_timestamp, print_json, CliResult, Context};

#[derive(Debug, Args)]
pub struct StatsArgs {
    #[command(subcommand)]
    pub command: StatsCommand,
}

#[derive(Debug, Subcommand)]
pub enum StatsCommand {
    /// Change counts over (base, target]
    Changes(ChangesArgs),
    /// Backup outcomes and the health score
    Backups(BackupsArgs),
}

#[derive(Debug, Args)]
pub struct ChangesArgs {
    #[arg(long)]
    pub tenant: String,

    /// Upper bound, inclusive (RFC 3339); defaults to now
    #[arg(long, value_parser = parse_timestamp)]
    pub target: Option<DateTime<Utc>>,

    /// Lower bound, exclusive (RFC 3339)
    #[arg(long, value_parser = parse_timestamp)]
    pub base: Option<DateTime<Utc>>,
}

#[derive(Debug, Args)]
pub struct BackupsArgs {
    #[arg(long)]
    pub tenant: String,
}

#[derive(Serialize)]
struct BackupReport {
    #[serde(flatten)]
    statistics: pitr_core::BackupStatistics,
    health_score: u8,
}

pub fn execute(ctx: &Context, args: StatsArgs) -> CliResult {
    match args.command {
        StatsCommand::Changes(changes) => {
            let stats = calculate_stats(
                &ctx.conn,
                &ctx.config,
                &changes.tenant,
                changes.target.unwrap_or_else(Utc::now),
                changes.base,
            )?;
            print_json(&stats)
        }
        StatsCommand::Backups(backups) => {
            let report = BackupReport {
                statistics: backup_statistics(&ctx.conn, &backups.tenant)?,
                health_score: health_score(&ctx.conn, &backups.tenant)?,
            };
            print_json(&report)
        }
    }
}
