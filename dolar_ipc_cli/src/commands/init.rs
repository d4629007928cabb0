//! The `init` subcommand: create the history table.

use anyhow::Result;
use clap::Args;
use dolar_ipc_lib::pipeline::StoreSettings;
use dolar_ipc_lib::Config;

use super::table_name;

/// Arguments for the `init` subcommand.
#[derive(Args)]
pub struct InitArgs {
    /// History table (defaults to the configured table)
    #[arg(long)]
    pub table: Option<String>,
}

pub fn run(args: &InitArgs, config: &Config) -> Result<()> {
    let table = table_name(args.table.as_deref(), config);
    let store = StoreSettings::from_config(config);
    let db = store.open()?;
    db.ensure_table(table)?;
    eprintln!("Table {} ready in {}", table, store.db_path.display());
    Ok(())
}
