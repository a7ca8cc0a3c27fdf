use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use salegraph::{
    config::{Config, ConfigUpdate},
    observability, server,
};

use crate::logging;

#[derive(Args, Clone, Default)]
pub struct StartArgs {
    /// Override the configured server port
    #[arg(long)]
    pub port: Option<u16>,

    /// Override the configured data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// NDJSON event log to ingest while serving
    #[arg(long, value_name = "FILE")]
    pub events: Option<PathBuf>,
}

pub async fn execute(config_path: Option<PathBuf>, args: StartArgs) -> Result<()> {
    let (mut config, _) = super::load_config(config_path)?;
    apply_start_overrides(&mut config, &args);
    config.validate()?;
    config.ensure_data_dir()?;

    logging::init(&config.logs_path())?;
    if config.api.metrics {
        observability::init()?;
    }

    server::run(config, args.events)
        .await
        .context("salegraph server failed")
}

fn apply_start_overrides(config: &mut Config, args: &StartArgs) {
    config.apply_update(ConfigUpdate {
        port: args.port,
        data_dir: args.data_dir.clone(),
        ..ConfigUpdate::default()
    });
}
