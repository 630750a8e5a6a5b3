//! Usage: pitr backup chain <BACKUP_ID>

use clap::{Args, Subcommand};
use pitr_engine::commands::backups::get_backup_chain;

use super::{print_json, CliResult, Context};

#[derive(Debug, Args)]
pub struct BackupArgs {
    #[command(subcommand)]
    pub command: BackupCommand,
}

#[derive(Debug, Subcommand)]
pub enum BackupCommand {
    /// Jobs from the base full backup up to the given one
    Chain { backup_id: String },
}

pub fn execute(ctx: &Context, args: BackupArgs) -> CliResult {
    match args.command {
        BackupCommand::Chain { backup_id } => print_json(&get_backup_chain(&ctx.conn, &backup_id)?),
    }
}
