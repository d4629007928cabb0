//! The `fetch` subcommand: download one series and write its snapshot file.

use anyhow::Result;
use clap::Args;
use dolar_ipc_lib::pipeline::fetch_and_store;
use dolar_ipc_lib::{Client, Config};
use serde::Serialize;

use super::LogicalDateArgs;
use crate::output::{print_json, OutputFormat};

/// Arguments for the `fetch` subcommand.
#[derive(Args)]
pub struct FetchArgs {
    /// Source name from the configuration
    #[arg(long)]
    pub source: String,

    #[command(flatten)]
    pub when: LogicalDateArgs,
}

#[derive(Serialize)]
struct FetchResult {
    source: String,
    rows: usize,
    path: String,
}

pub async fn run(args: &FetchArgs, config: &Config, format: &OutputFormat) -> Result<()> {
    let ctx = args.when.context()?;
    let source = config
        .select_sources(std::slice::from_ref(&args.source))?
        .remove(0);
    let spec = source.endpoint_spec(&config.pipeline.data_dir, ctx.logical_date);

    let client = Client::with_timeout(&config.pipeline.base_url, config.pipeline.request_timeout())?;
    let snapshot = fetch_and_store(&client, &spec).await?;

    let result = FetchResult {
        source: spec.name.clone(),
        rows: snapshot.len(),
        path: spec.save_path.display().to_string(),
    };
    match format {
        OutputFormat::Json => print_json(&result),
        OutputFormat::Table => println!(
            "{}: wrote {} rows to {}",
            result.source, result.rows, result.path
        ),
    }
    Ok(())
}
