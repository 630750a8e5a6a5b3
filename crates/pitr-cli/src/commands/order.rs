//! Usage: pitr order --tables a,b,c

use clap::Args;
use pitr_engine::commands::rollback::get_restoration_order;

use super::{CliResult, Context};

#[derive(Debug, Args)]
pub struct OrderArgs {
    #[arg(long, value_delimiter = ',', required = true)]
    pub tables: Vec<String>,
}

pub fn execute(ctx: &Context, args: OrderArgs) -> CliResult {
    let order = get_restoration_order(&ctx.conn, &args.tables)?;
    for (position, table) in order.iter().enumerate() {
        println!("{}. {}", position + 1, table);
    }
    Ok(())
}
