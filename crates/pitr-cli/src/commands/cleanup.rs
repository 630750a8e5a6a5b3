//! Usage: pitr cleanup

use super::{CliResult, Context};

pub fn execute(ctx: &Context) -> CliResult {
    let deleted = pitr_engine::commands::retention::cleanup_expired_snapshots(&ctx.conn)?;
    println!("Deleted {} expired snapshots", deleted);
    Ok(())
}
