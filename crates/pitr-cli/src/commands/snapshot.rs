//! Snapshot commands
//!
//! Usage:
//!   pitr snapshot create --tenant <T> --tables a,b --by <USER> [--name <N>] [--expires-at <TS>]
//!   pitr snapshot list --tenant <T>
//!   pitr snapshot validate <SNAPSHOT_ID>

use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use pitr_engine::commands::integrity::validate_integrity;
use pitr_engine::commands::snapshot::SnapshotRequest;
use pitr_engine::{apply_engine_command, EngineCommand, EngineCommandResult};

use super::{parse_timestamp, print_json, CliResult, Context};

#[derive(Debug, Args)]
pub struct SnapshotArgs {
    #[command(subcommand)]
    pub command: SnapshotCommand,
}

#[derive(Debug, Subcommand)]
pub enum SnapshotCommand {
    /// Capture the tenant's current rows of the given tables
    Create(CreateArgs),
    /// List snapshots not yet consumed by a rollback
    List(ListArgs),
    /// Compare a snapshot with the tenant's current rows
    Validate(ValidateArgs),
}

#[derive(Debug, Args)]
pub struct CreateArgs {
    #[arg(long)]
    pub tenant: String,

    #[arg(long, value_delimiter = ',', required = true)]
    pub tables: Vec<String>,

    #[arg(long = "by")]
    pub created_by: String,

    #[arg(long, default_value = "")]
    pub name: String,

    /// Override the configured lifetime (RFC 3339)
    #[arg(long, value_parser = parse_timestamp)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(long)]
    pub tenant: String,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    pub snapshot_id: String,
}

pub fn execute(ctx: &mut Context, args: SnapshotArgs) -> CliResult {
    match args.command {
        SnapshotCommand::Create(create_args) => execute_create(ctx, create_args),
        SnapshotCommand::List(list_args) => {
            let active =
                pitr_engine::commands::snapshot::get_active_snapshots(&ctx.conn, &list_args.tenant)?;
            print_json(&active)
        }
        SnapshotCommand::Validate(validate_args) => {
            let report = validate_integrity(&ctx.conn, &validate_args.snapshot_id)?;
            print_json(&report)?;
            if !report.valid {
                return Err("snapshot does not match current state".into());
            }
            Ok(())
        }
    }
}

fn execute_create(ctx: &mut Context, args: CreateArgs) -> CliResult {
    let request = SnapshotRequest {
        tenant_id: args.tenant,
        tables: args.tables,
        created_by: args.created_by,
        name: args.name,
        expires_at: args.expires_at,
    };

    match apply_engine_command(
        EngineCommand::CreateSnapshot(request),
        &mut ctx.conn,
        &ctx.config,
    )? {
        EngineCommandResult::SnapshotCreated(snapshot_id) => {
            println!("Snapshot created:");
            println!("  snapshot_id: {}", snapshot_id);
            Ok(())
        }
        other => Err(format!("unexpected engine result: {:?}", other).into()),
    }
}
