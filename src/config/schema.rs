use std::path::Path;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

use crate::data_types::DEFAULT_SCHEMA;

pub const ENV_PREFIX: &str = "TABLEGATE";

#[derive(Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct TablegateConfig {
    pub database: Database,
    #[serde(default)]
    pub frontend: Frontend,
    #[serde(default)]
    pub misc: Misc,
}

#[derive(Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct Database {
    pub dsn: String,
    #[serde(default = "default_schema")]
    pub default_schema: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    pub statement_timeout_ms: Option<u64>,
}

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

fn default_max_connections() -> u32 {
    16
}

fn default_min_connections() -> u32 {
    1
}

fn default_idle_timeout_ms() -> u64 {
    30000
}

impl Default for Database {
    fn default() -> Self {
        Self {
            dsn: String::new(),
            default_schema: default_schema(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            idle_timeout_ms: default_idle_timeout_ms(),
            statement_timeout_ms: None,
        }
    }
}

#[derive(Deserialize, Debug, PartialEq, Eq, Default, Clone)]
pub struct Frontend {
    pub http: Option<HttpFrontend>,
}

#[derive(Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(default)]
pub struct HttpFrontend {
    pub bind_host: String,
    pub bind_port: u16,
    pub request_timeout_ms: u64,
}

impl Default for HttpFrontend {
    fn default() -> Self {
        Self {
            bind_host: "127.0.0.1".to_string(),
            bind_port: 8080,
            request_timeout_ms: 30000,
        }
    }
}

#[derive(Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(default)]
pub struct Misc {
    pub default_page_size: u32,
}

impl Default for Misc {
    fn default() -> Self {
        Self {
            default_page_size: 10,
        }
    }
}

pub fn validate_config(config: TablegateConfig) -> Result<TablegateConfig, ConfigError> {
    if !(config.database.dsn.starts_with("postgres://")
        || config.database.dsn.starts_with("postgresql://"))
    {
        return Err(ConfigError::Message(
            "database.dsn must be a PostgreSQL connection string \
            (postgres:// or postgresql://)"
                .to_string(),
        ));
    }

    if config.database.default_schema.trim().is_empty() {
        return Err(ConfigError::Message(
            "database.default_schema can't be empty".to_string(),
        ));
    }

    if config.database.min_connections > config.database.max_connections {
        return Err(ConfigError::Message(format!(
            "database.min_connections ({}) is larger than database.max_connections ({})",
            config.database.min_connections, config.database.max_connections
        )));
    }

    if config.misc.default_page_size == 0 {
        return Err(ConfigError::Message(
            "misc.default_page_size must be at least 1".to_string(),
        ));
    }

    Ok(config)
}

fn environment() -> Environment {
    // e.g. TABLEGATE__DATABASE__DSN
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}

pub fn load_config(path: &Path) -> Result<TablegateConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::from(path))
        .add_source(environment());

    config.build()?.try_deserialize().and_then(validate_config)
}

// Load a config from a string (to test our structs are defined correctly)
pub fn load_config_from_string(
    config_str: &str,
    skip_validation: bool,
) -> Result<TablegateConfig, ConfigError> {
    let config =
        Config::builder().add_source(File::from_str(config_str, FileFormat::Toml));

    if skip_validation {
        config.build()?.try_deserialize()
    } else {
        config.build()?.try_deserialize().and_then(validate_config)
    }
}
