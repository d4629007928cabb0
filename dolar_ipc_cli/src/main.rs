mod commands;
mod output;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dolar_ipc_lib::config::DEFAULT_SECTION;
use dolar_ipc_lib::Config;

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "dolar-ipc")]
#[command(about = "Monthly dollar quote and CPI history loader for datos.gob.ar")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, env = "DOLAR_IPC_CONFIG", default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Configuration section holding the database connection
    #[arg(long, default_value = DEFAULT_SECTION, global = true)]
    section: String,

    /// Output format: table or json
    #[arg(long, default_value = "table", global = true)]
    output: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, load and scan every configured source
    Run(commands::run::RunArgs),
    /// Fetch one source and write its snapshot file
    Fetch(commands::fetch::FetchArgs),
    /// Load a snapshot file into the history table
    Load(commands::load::LoadArgs),
    /// Report dates whose dollar quote is above the threshold
    Scan(commands::scan::ScanArgs),
    /// Create the history table if it does not exist
    Init(commands::init::InitArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dolar_ipc=info".parse()?)
                .add_directive("datosgob_api=info".parse()?),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let format = match cli.output.as_str() {
        "json" => OutputFormat::Json,
        _ => OutputFormat::Table,
    };

    let config = Config::load(&cli.config, &cli.section)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;

    match &cli.command {
        Commands::Run(args) => commands::run::run(args, &config, &format).await?,
        Commands::Fetch(args) => commands::fetch::run(args, &config, &format).await?,
        Commands::Load(args) => commands::load::run(args, &config, &format)?,
        Commands::Scan(args) => commands::scan::run(args, &config, &format)?,
        Commands::Init(args) => commands::init::run(args, &config)?,
    }

    Ok(())
}
