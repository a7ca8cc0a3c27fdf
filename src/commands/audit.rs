use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Args;

use salegraph::Indexer;

use crate::logging;

#[derive(Args)]
pub struct AuditArgs {
    /// Emit the audit report as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

pub fn execute(config_path: Option<PathBuf>, args: AuditArgs) -> Result<()> {
    logging::init_stderr("warn");
    let (config, _) = super::load_config(config_path)?;
    let indexer = Indexer::new(super::open_store(&config)?);
    let report = indexer.audit()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "checked {} investor summaries and {} records",
            report.summaries, report.records
        );
        for mismatch in &report.mismatches {
            println!("  mismatch: {mismatch}");
        }
    }

    if !report.is_consistent() {
        bail!(
            "audit found {} inconsistencies; replay the event log into a fresh data directory",
            report.mismatches.len()
        );
    }
    if !args.json {
        println!("all totals and counters are consistent");
    }
    Ok(())
}
