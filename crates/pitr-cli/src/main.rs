//! PITR CLI
//!
//! Command-line interface for the point-in-time recovery engine

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "pitr")]
#[command(about = "PITR - Tenant snapshots and rollbacks", long_about = None)]
struct Cli {
    /// Database file
    #[arg(long, global = true, default_value = ".pitr/pitr.db")]
    db: PathBuf,

    /// Engine configuration (TOML); defaults apply when the file is absent
    #[arg(long, global = true, default_value = "pitr.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create the database, register tables and grant them to tenants
    Init(commands::init::InitArgs),
    /// Snapshot operations
    Snapshot(commands::snapshot::SnapshotArgs),
    /// Rollback operations
    Rollback(commands::rollback::RollbackArgs),
    /// Print the restoration order of tables
    Order(commands::order::OrderArgs),
    /// Change and backup statistics
    Stats(commands::stats::StatsArgs),
    /// Backup job operations
    Backup(commands::backup::BackupArgs),
    /// Delete expired snapshots that were never rolled back
    Cleanup,
}

fn main() {
    let cli = Cli::parse();

    let result = commands::Context::open(&cli.db, &cli.config).and_then(|mut ctx| {
        pitr_core::logging_facility::init(ctx.config.logging_profile);
        match cli.command {
            Commands::Init(args) => commands::init::execute(&mut ctx, args),
            Commands::Snapshot(args) => commands::snapshot::execute(&mut ctx, args),
            Commands::Rollback(args) => commands::rollback::execute(&mut ctx, args),
            Commands::Order(args) => commands::order::execute(&ctx, args),
            Commands::Stats(args) => commands::stats::execute(&ctx, args),
            Commands::Backup(args) => commands::backup::execute(&ctx, args),
            Commands::Cleanup => commands::cleanup::execute(&ctx),
        }
    });

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
