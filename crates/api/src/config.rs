//! Service configuration.
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file (`config/stockledger.toml`, or the path in `STOCKLEDGER_CONFIG`), then
//! `STOCKLEDGER__*` environment variables (`STOCKLEDGER__SERVER__PORT=9000`).

use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use stockledger_infra::LedgerConfig;
use stockledger_observability::LogConfig;

const DEFAULT_CONFIG_FILE: &str = "config/stockledger";
const ENV_PREFIX: &str = "STOCKLEDGER";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            database_url: None,
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub log: LogConfig,
    pub storage: StorageConfig,
    pub ledger: LedgerConfig,
    /// JSON file of warehouses and products loaded at start-up.
    pub seed_file: Option<PathBuf>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let file = std::env::var(format!("{ENV_PREFIX}_CONFIG")).ok();
        let required = file.is_some();
        let file = file.unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

        Config::builder()
            .add_source(File::with_name(&file).required(required))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()
    }
}
