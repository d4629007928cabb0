//! The `load` subcommand: load an existing snapshot file.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use dolar_ipc_lib::pipeline::StoreSettings;
use dolar_ipc_lib::{loader, Config};

use super::table_name;
use crate::output::{print_json, print_load_table, OutputFormat};

/// Arguments for the `load` subcommand.
#[derive(Args)]
pub struct LoadArgs {
    /// Snapshot CSV file to load
    #[arg(long)]
    pub file: PathBuf,

    /// History table (defaults to the configured table)
    #[arg(long)]
    pub table: Option<String>,
}

pub fn run(args: &LoadArgs, config: &Config, format: &OutputFormat) -> Result<()> {
    let table = table_name(args.table.as_deref(), config);
    let mut db = StoreSettings::from_config(config).open()?;
    let outcome = loader::load(&mut db, &args.file, table)?;

    match format {
        OutputFormat::Table => print_load_table(table, &outcome),
        OutputFormat::Json => print_json(&outcome),
    }
    Ok(())
}
