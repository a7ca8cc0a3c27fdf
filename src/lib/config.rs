use std::{
    env, fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{IndexError, Result};

pub const DEFAULT_PORT: u16 = 7070;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bool_true")]
    pub graphql: bool,
    #[serde(default = "default_bool_true")]
    pub metrics: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            graphql: true,
            metrics: true,
        }
    }
}

/// Decimal places used when rendering amounts in the CLI report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_capital_decimals")]
    pub capital_decimals: u8,
    #[serde(default = "default_token_decimals")]
    pub token_decimals: u8,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            capital_decimals: default_capital_decimals(),
            token_decimals: default_token_decimals(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub port: u16,
    pub data_dir: PathBuf,
    #[serde(default = "default_list_page_size")]
    pub list_page_size: usize,
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
    #[serde(default)]
    pub api: ApiConfig,
    /// GraphQL endpoint queried by `salegraph report`.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub display: DisplayConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Config {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            port: DEFAULT_PORT,
            data_dir: default_data_dir(),
            list_page_size: default_list_page_size(),
            page_limit: default_page_limit(),
            api: ApiConfig::default(),
            endpoint: default_endpoint(),
            display: DisplayConfig::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigUpdate {
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
    pub list_page_size: Option<usize>,
    pub page_limit: Option<usize>,
    pub graphql: Option<bool>,
    pub metrics: Option<bool>,
    pub endpoint: Option<String>,
    pub capital_decimals: Option<u8>,
    pub token_decimals: Option<u8>,
}

impl ConfigUpdate {
    pub fn is_empty(&self) -> bool {
        self.port.is_none()
            && self.data_dir.is_none()
            && self.list_page_size.is_none()
            && self.page_limit.is_none()
            && self.graphql.is_none()
            && self.metrics.is_none()
            && self.endpoint.is_none()
            && self.capital_decimals.is_none()
            && self.token_decimals.is_none()
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let mut path = default_config_root()?;
    path.push("config.toml");
    Ok(path)
}

pub fn load_or_default(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let config_path = if let Some(path) = path {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        path
    } else {
        let path = default_config_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        path
    };

    if config_path.exists() {
        let contents = fs::read_to_string(&config_path)?;
        let cfg: Config = toml::from_str(&contents)?;
        cfg.validate()?;
        cfg.ensure_data_dir()?;
        Ok((cfg, config_path))
    } else {
        let cfg = Config::default();
        cfg.ensure_data_dir()?;
        cfg.save(&config_path)?;
        Ok((cfg, config_path))
    }
}

impl Config {
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn apply_update(&mut self, update: ConfigUpdate) {
        if let Some(port) = update.port {
            self.port = port;
        }
        if let Some(dir) = update.data_dir {
            self.data_dir = dir;
        }
        if let Some(list_page_size) = update.list_page_size {
            self.list_page_size = list_page_size;
        }
        if let Some(page_limit) = update.page_limit {
            self.page_limit = page_limit;
        }
        if let Some(graphql) = update.graphql {
            self.api.graphql = graphql;
        }
        if let Some(metrics) = update.metrics {
            self.api.metrics = metrics;
        }
        if let Some(endpoint) = update.endpoint {
            let trimmed = endpoint.trim();
            if !trimmed.is_empty() {
                self.endpoint = trimmed.to_string();
            }
        }
        if let Some(decimals) = update.capital_decimals {
            self.display.capital_decimals = decimals;
        }
        if let Some(decimals) = update.token_decimals {
            self.display.token_decimals = decimals;
        }
        self.updated_at = Utc::now();
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_limit == 0 {
            return Err(IndexError::Config("page_limit must be at least 1".into()));
        }
        if self.list_page_size > self.page_limit {
            return Err(IndexError::Config(format!(
                "list_page_size ({}) exceeds page_limit ({})",
                self.list_page_size, self.page_limit
            )));
        }
        for (name, decimals) in [
            ("capital_decimals", self.display.capital_decimals),
            ("token_decimals", self.display.token_decimals),
        ] {
            if decimals > 77 {
                return Err(IndexError::Config(format!(
                    "{name} ({decimals}) is wider than a 256-bit amount"
                )));
            }
        }
        Ok(())
    }

    pub fn ensure_data_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }

    pub fn entity_store_path(&self) -> PathBuf {
        self.data_dir.join("entities")
    }

    pub fn logs_path(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

fn default_config_root() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        Ok(home.join(".salegraph"))
    } else {
        env::current_dir()
            .map(|dir| dir.join(".salegraph"))
            .map_err(|err| IndexError::Config(err.to_string()))
    }
}

fn default_data_dir() -> PathBuf {
    default_config_root().unwrap_or_else(|_| PathBuf::from(".salegraph"))
}

fn default_bool_true() -> bool {
    true
}

fn default_list_page_size() -> usize {
    100
}

fn default_page_limit() -> usize {
    1000
}

fn default_endpoint() -> String {
    format!("http://127.0.0.1:{DEFAULT_PORT}/graphql")
}

fn default_capital_decimals() -> u8 {
    6
}

fn default_token_decimals() -> u8 {
    18
}
