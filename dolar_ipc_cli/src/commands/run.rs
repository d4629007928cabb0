//! The `run` subcommand: the whole Fetch → Load → Scan pipeline.

use anyhow::{bail, Result};
use clap::Args;
use dolar_ipc_lib::{Config, FixedDelay, NoRetry, PipelineRunner, RetryPolicy, RunContext};

use super::LogicalDateArgs;
use crate::output::{print_json, print_run_summary_table, run_summary_rows, OutputFormat};

/// Arguments for the `run` subcommand.
#[derive(Args)]
pub struct RunArgs {
    /// Only run these sources (repeatable). Defaults to every configured source.
    #[arg(long = "source")]
    pub sources: Vec<String>,

    #[command(flatten)]
    pub when: LogicalDateArgs,

    /// Fail a stage on its first error instead of applying the retry policy
    #[arg(long)]
    pub no_retry: bool,
}

pub async fn run(args: &RunArgs, config: &Config, format: &OutputFormat) -> Result<()> {
    let ctx = args.when.context()?;
    if args.no_retry {
        execute(args, config, NoRetry, &ctx, format).await
    } else {
        let policy = FixedDelay::new(config.pipeline.max_retries, config.pipeline.retry_delay());
        execute(args, config, policy, &ctx, format).await
    }
}

async fn execute<P: RetryPolicy + 'static>(
    args: &RunArgs,
    config: &Config,
    policy: P,
    ctx: &RunContext,
    format: &OutputFormat,
) -> Result<()> {
    let sources = config.select_sources(&args.sources)?;
    let runner = PipelineRunner::from_config(config, policy)?.with_sources(sources);
    let summary = runner.run(ctx).await;

    let rows = run_summary_rows(&summary);
    match format {
        OutputFormat::Table => print_run_summary_table(&rows),
        OutputFormat::Json => print_json(&rows),
    }

    let failed = summary.failed().count();
    if failed > 0 {
        bail!(
            "{} of {} sources failed for {}",
            failed,
            summary.outcomes.len(),
            summary.logical_date
        );
    }
    Ok(())
}
