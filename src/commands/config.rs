use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use salegraph::config::ConfigUpdate;

use crate::logging;

#[derive(Args)]
pub struct ConfigArgs {
    #[arg(long)]
    pub port: Option<u16>,

    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    #[arg(long)]
    pub list_page_size: Option<usize>,

    #[arg(long = "page-limit")]
    pub page_limit: Option<usize>,

    /// Enable or disable the GraphQL endpoint
    #[arg(long)]
    pub graphql: Option<bool>,

    /// Enable or disable the Prometheus endpoint
    #[arg(long)]
    pub metrics: Option<bool>,

    /// GraphQL endpoint used by `salegraph report`
    #[arg(long)]
    pub endpoint: Option<String>,

    #[arg(long)]
    pub capital_decimals: Option<u8>,

    #[arg(long)]
    pub token_decimals: Option<u8>,
}

pub fn execute(config_path: Option<PathBuf>, args: ConfigArgs) -> Result<()> {
    logging::init_stderr("info");
    let (mut config, path) = super::load_config(config_path)?;

    let ConfigArgs {
        port,
        data_dir,
        list_page_size,
        page_limit,
        graphql,
        metrics,
        endpoint,
        capital_decimals,
        token_decimals,
    } = args;

    let update = ConfigUpdate {
        port,
        data_dir,
        list_page_size,
        page_limit,
        graphql,
        metrics,
        endpoint,
        capital_decimals,
        token_decimals,
    };

    if update.is_empty() {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    config.apply_update(update);
    config.validate()?;
    config.ensure_data_dir()?;
    config.save(&path)?;

    tracing::info!("Configuration saved to {}", path.display());
    Ok(())
}
