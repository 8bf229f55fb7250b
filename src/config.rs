use std::fmt;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use toml::Value;

use crate::common::schema::TableSpec;
use crate::migrate::migration_options::{MigrationOptions, DEFAULT_BATCH_SIZE};

const DEFAULT_PORT: u16 = 1433;

#[derive(Debug)]
pub struct Config {
    source_database: DatabaseConfig,
    target_database: DatabaseConfig,
    settings: SettingsConfig,
}

#[derive(Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub encrypt: bool,
    pub trust_server_certificate: bool,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("encrypt", &self.encrypt)
            .field("trust_server_certificate", &self.trust_server_certificate)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SettingsConfig {
    pub tables: Vec<TableSpec>,
    pub options: MigrationOptions,
}

impl Config {
    pub fn from_toml(config: Value) -> Result<Self> {
        let source_database = parse_database_config(
            config
                .get("source_database")
                .ok_or(anyhow!("Missing or invalid source database settings"))?,
        )
        .context("Invalid [source_database] section")?;
        let target_database = parse_database_config(
            config
                .get("target_database")
                .ok_or(anyhow!("Missing or invalid target database settings"))?,
        )
        .context("Invalid [target_database] section")?;
        let settings = parse_settings_config(
            config
                .get("settings")
                .ok_or(anyhow!("Missing or invalid settings"))?,
        )
        .context("Invalid [settings] section")?;

        Ok(Config {
            source_database,
            target_database,
            settings,
        })
    }

    pub fn source_database(&self) -> &DatabaseConfig {
        &self.source_database
    }

    pub fn target_database(&self) -> &DatabaseConfig {
        &self.target_database
    }

    pub fn settings(&self) -> &SettingsConfig {
        &self.settings
    }
}

fn required_str(config: &Value, key: &str) -> Result<String> {
    config
        .get(key)
        .and_then(|value| value.as_str())
        .map(|value| value.to_string())
        .ok_or_else(|| anyhow!("Missing or invalid {}", key))
}

fn optional_bool(config: &Value, key: &str) -> Result<bool> {
    match config.get(key) {
        None => Ok(false),
        Some(value) => value
            .as_bool()
            .ok_or_else(|| anyhow!("Invalid {}, expected true or false", key)),
    }
}

fn parse_database_config(config: &Value) -> Result<DatabaseConfig> {
    let host = required_str(config, "host")?;

    let port = match config.get("port") {
        None => DEFAULT_PORT,
        Some(value) => value
            .as_integer()
            .ok_or_else(|| anyhow!("Missing or invalid port"))?
            .try_into()
            .context("Port out of range")?,
    };

    let username = required_str(config, "username")?;
    let password = required_str(config, "password")?;
    let database = required_str(config, "database")?;
    let encrypt = optional_bool(config, "encrypt")?;
    let trust_server_certificate = optional_bool(config, "trust_server_certificate")?;

    Ok(DatabaseConfig {
        host,
        port,
        username,
        password,
        database,
        encrypt,
        trust_server_certificate,
    })
}

fn parse_settings_config(config: &Value) -> Result<SettingsConfig> {
    let tables = config
        .get("tables")
        .and_then(|value| value.as_array())
        .ok_or_else(|| anyhow!("Missing or invalid tables"))?
        .iter()
        .map(|value| {
            value
                .as_str()
                .ok_or_else(|| anyhow!("Table names must be strings"))
                .and_then(|name| TableSpec::new(name).map_err(|err| anyhow!(err)))
        })
        .collect::<Result<Vec<TableSpec>>>()?;

    if tables.is_empty() {
        return Err(anyhow!("No tables to migrate"));
    }

    let batch_size = match config.get("batch_size") {
        None => DEFAULT_BATCH_SIZE,
        Some(value) => value
            .as_integer()
            .filter(|size| *size > 0)
            .ok_or_else(|| anyhow!("Invalid batch_size, expected a positive integer"))?
            as usize,
    };

    let operation_timeout = match config.get("operation_timeout_secs") {
        None => None,
        Some(value) => {
            let secs = value
                .as_integer()
                .filter(|secs| *secs >= 0)
                .ok_or_else(|| anyhow!("Invalid operation_timeout_secs"))?;
            // 0 disables the timeout
            (secs > 0).then(|| Duration::from_secs(secs as u64))
        }
    };

    let failure_policy = match config.get("failure_policy") {
        None => Default::default(),
        Some(value) => value
            .as_str()
            .ok_or_else(|| anyhow!("Invalid failure_policy"))?
            .parse()
            .map_err(|err: String| anyhow!(err))?,
    };

    let constraint_strategy = match config.get("constraint_strategy") {
        None => Default::default(),
        Some(value) => value
            .as_str()
            .ok_or_else(|| anyhow!("Invalid constraint_strategy"))?
            .parse()
            .map_err(|err: String| anyhow!(err))?,
    };

    Ok(SettingsConfig {
        tables,
        options: MigrationOptions {
            batch_size,
            operation_timeout,
            failure_policy,
            constraint_strategy,
        },
    })
}
