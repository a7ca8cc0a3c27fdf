use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};

use salegraph::{
    config::{Config, load_or_default},
    store::EntityStore,
};

pub mod audit;
pub mod config;
pub mod ingest;
pub mod report;
pub mod start;
pub mod summary;

pub(crate) fn load_config(config_path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    load_or_default(config_path).context("failed to load configuration")
}

pub(crate) fn open_store(config: &Config) -> Result<Arc<EntityStore>> {
    let path = config.entity_store_path();
    let store = EntityStore::open(path.clone())
        .with_context(|| format!("failed to open entity store at {}", path.display()))?;
    Ok(Arc::new(store))
}
