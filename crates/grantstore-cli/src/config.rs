//! Application configuration: TOML file plus `GRANTSTORE__*` overrides.

use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use grantstore::GrantStoreConfig;
use grantstore_postgres::PostgresConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: GrantStoreConfig,
    pub postgres: PostgresConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        self.store.validate()?;
        self.postgres
            .validate()
            .map_err(|message| anyhow::anyhow!(message))?;
        Ok(())
    }
}

/// Environment overrides, e.g. `GRANTSTORE__POSTGRES__URL`.
fn environment() -> Environment {
    Environment::with_prefix("GRANTSTORE")
        .try_parsing(true)
        .separator("__")
}

/// Loads the configuration file if it exists, then applies environment overrides.
pub fn load_config(path: &str) -> Result<AppConfig> {
    build(path, environment())
}

fn build(path: &str, env: Environment) -> Result<AppConfig> {
    let mut builder = Config::builder();
    if Path::new(path).exists() {
        builder = builder.add_source(File::with_name(path));
    }

    let merged: AppConfig = builder
        .add_source(env)
        .build()
        .context("config build error")?
        .try_deserialize()
        .context("config deserialize error")?;

    merged.validate()?;
    Ok(merged)
}
