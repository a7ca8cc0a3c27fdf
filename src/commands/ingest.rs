use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Args;

use salegraph::{Indexer, event::EventLog, store::EntityStore};

use crate::logging;

#[derive(Args)]
pub struct IngestArgs {
    /// NDJSON file with one sale event per line
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Apply the log to an empty in-memory store and leave the data directory untouched
    #[arg(long)]
    pub dry_run: bool,

    /// Emit the ingest report as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

pub fn execute(config_path: Option<PathBuf>, args: IngestArgs) -> Result<()> {
    logging::init_stderr("info");
    let (config, _) = super::load_config(config_path)?;

    let store = if args.dry_run {
        Arc::new(EntityStore::in_memory())
    } else {
        super::open_store(&config)?
    };
    let indexer = Indexer::new(store);

    let log = EventLog::open(&args.file)?;
    let report = indexer
        .ingest(log)
        .with_context(|| format!("ingestion of {} halted", args.file.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let cursor = report
            .cursor
            .map(|cursor| cursor.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "applied={} already_applied={} cursor={}{}",
            report.applied,
            report.already_applied,
            cursor,
            if args.dry_run { " (dry run)" } else { "" }
        );
    }
    Ok(())
}
