//! Rollback commands
//!
//! Usage:
//!   pitr rollback execute --tenant <T> --snapshot <ID> --by <USER> --reason <R> [--target <TS>] [--dry-run]
//!   pitr rollback history --tenant <T> [--limit <N>]

use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use pitr_core::RollbackStatus;
use pitr_engine::commands::rollback::get_rollback_history;
use pitr_engine::{apply_engine_command, EngineCommand, EngineCommandResult, RollbackRequest};

use super::{parse_timestamp, print_json, CliResult, Context};

#[derive(Debug, Args)]
pub struct RollbackArgs {
    #[command(subcommand)]
    pub command: RollbackCommand,
}

#[derive(Debug, Subcommand)]
pub enum RollbackCommand {
    /// Roll a tenant back to a snapshot
    Execute(ExecuteArgs),
    /// Most recent rollbacks of a tenant
    History(HistoryArgs),
}

#[derive(Debug, Args)]
pub struct ExecuteArgs {
    #[arg(long)]
    pub tenant: String,

    #[arg(long)]
    pub snapshot: String,

    #[arg(long = "by")]
    pub initiated_by: String,

    #[arg(long, default_value = "")]
    pub reason: String,

    /// Replay logged changes up to this instant (RFC 3339)
    #[arg(long, value_parser = parse_timestamp)]
    pub target: Option<DateTime<Utc>>,

    /// Report the changes the rollback would undo without writing
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    #[arg(long)]
    pub tenant: String,

    #[arg(long)]
    pub limit: Option<usize>,
}

pub fn execute(ctx: &mut Context, args: RollbackArgs) -> CliResult {
    match args.command {
        RollbackCommand::Execute(execute_args) => execute_rollback(ctx, execute_args),
        RollbackCommand::History(history_args) => {
            let history = get_rollback_history(
                &ctx.conn,
                &ctx.config,
                &history_args.tenant,
                history_args.limit,
            )?;
            print_json(&history)
        }
    }
}

fn execute_rollback(ctx: &mut Context, args: ExecuteArgs) -> CliResult {
    let request = RollbackRequest {
        tenant_id: args.tenant,
        snapshot_id: args.snapshot,
        initiated_by: args.initiated_by,
        reason: args.reason,
        target_timestamp: args.target,
    };
    let cmd = EngineCommand::ExecuteRollback {
        request,
        dry_run: args.dry_run,
    };

    match apply_engine_command(cmd, &mut ctx.conn, &ctx.config)? {
        EngineCommandResult::RollbackDryRun(stats) => {
            println!("Dry run (no changes):");
            print_json(&stats)
        }
        EngineCommandResult::RollbackFinished(record) => {
            print_json(&record)?;
            if record.status == RollbackStatus::Failed {
                return Err(format!(
                    "rollback {} failed at {}",
                    record.id,
                    record.current_step.as_deref().unwrap_or("unknown step")
                )
                .into());
            }
            Ok(())
        }
        other => Err(format!("unexpected engine result: {:?}", other).into()),
    }
}
