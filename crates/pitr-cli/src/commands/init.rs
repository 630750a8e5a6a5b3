//! Database initialization
//!
//! Usage: pitr init [--schemas <FILE>] [--grant <TENANT>]...

use clap::Args;
use pitr_core::TableSchema;
use pitr_engine::commands::tables::{grant_table, register_table};
use std::path::PathBuf;

use super::{CliResult, Context};

#[derive(Debug, Args)]
pub struct InitArgs {
    /// JSON array of table schemas, registered in file order
    #[arg(long)]
    pub schemas: Option<PathBuf>,

    /// Tenant to grant every table in the schema file to
    #[arg(long = "grant")]
    pub tenants: Vec<String>,
}

pub fn execute(ctx: &mut Context, args: InitArgs) -> CliResult {
    let schemas: Vec<TableSchema> = match &args.schemas {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => Vec::new(),
    };

    for schema in &schemas {
        register_table(&mut ctx.conn, schema)?;
        println!("Registered table {}", schema.name);
    }
    for tenant in &args.tenants {
        for schema in &schemas {
            grant_table(&ctx.conn, tenant, &schema.name)?;
        }
        println!("Granted {} tables to {}", schemas.len(), tenant);
    }

    println!("Database ready");
    Ok(())
}
