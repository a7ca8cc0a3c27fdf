mod commands;
mod logging;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands::{
    audit::AuditArgs, config::ConfigArgs, ingest::IngestArgs, report::ReportArgs,
    start::StartArgs, summary::SummaryArgs,
};

#[derive(Parser)]
#[command(author, version, about = "Salegraph token-sale indexer CLI")]
struct Cli {
    /// Path to the configuration file. Defaults to ~/.salegraph/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the GraphQL server, optionally ingesting an event log
    Start(StartArgs),
    /// Apply an NDJSON event log to the entity store
    Ingest(IngestArgs),
    /// Re-derive totals and counters and report any inconsistency
    Audit(AuditArgs),
    /// Show the indexed summary for one investor address
    Summary(SummaryArgs),
    /// Print dashboard totals and top investors from a GraphQL endpoint
    Report(ReportArgs),
    /// Show or update configuration
    Config(ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli { config, command } = Cli::parse();

    match command {
        Commands::Start(args) => commands::start::execute(config, args).await?,
        Commands::Ingest(args) => commands::ingest::execute(config, args)?,
        Commands::Audit(args) => commands::audit::execute(config, args)?,
        Commands::Summary(args) => commands::summary::execute(config, args)?,
        Commands::Report(args) => commands::report::execute(config, args).await?,
        Commands::Config(args) => commands::config::execute(config, args)?,
    }

    Ok(())
}
