use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::env;
use taskflow_auth::IdpConfig;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub idp: IdpSettings,
    pub sidecar: SidecarConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    /// Optional database URL. Defaults to ./taskflow.sqlite
    pub url: Option<String>,
    /// Maximum number of database connections in the pool
    pub max_connections: u32,
    /// Connection timeout in seconds
    pub connection_timeout: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (pretty, json, compact)
    pub format: LogFormat,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

/// Identity provider settings plus the development bypass identity.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IdpSettings {
    pub sso_url: String,
    pub dev_mode: bool,
    pub dev_user_id: String,
    pub dev_user_email: String,
    pub dev_user_name: String,
}

impl IdpSettings {
    pub fn to_idp_config(&self) -> IdpConfig {
        IdpConfig {
            sso_url: self.sso_url.clone(),
            dev_mode: self.dev_mode,
            dev_user_id: self.dev_user_id.clone(),
            dev_user_email: self.dev_user_email.clone(),
            dev_user_name: self.dev_user_name.clone(),
        }
    }
}

/// Co-located pub/sub and scheduler sidecar.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SidecarConfig {
    /// Sidecar HTTP endpoint for publish and job registration
    pub endpoint: String,
    /// Pub/sub component name in the publish path
    pub pubsub_name: String,
}

impl Config {
    /// Load configuration from the embedded defaults, an optional
    /// CONFIG_FILE, and TASKFLOW_-prefixed environment variables.
    pub fn from_env() -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        builder = builder.add_source(File::from_str(
            include_str!("../config/default.toml"),
            FileFormat::Toml,
        ));

        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(
                File::with_name(&config_file)
                    .required(false)
                    .format(FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("TASKFLOW")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let mut result: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Self::apply_standard_env_vars(&mut result);

        Ok(result)
    }

    /// Load configuration from a specific file path.
    pub fn from_file(path: &str) -> Result<Self> {
        let builder = ConfigBuilder::builder()
            .add_source(File::from_str(
                include_str!("../config/default.toml"),
                FileFormat::Toml,
            ))
            .add_source(File::with_name(path).format(FileFormat::Toml))
            .add_source(
                Environment::with_prefix("TASKFLOW")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder
            .build()
            .context("Failed to build configuration from file")?;

        let mut result: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration from file")?;

        Self::apply_standard_env_vars(&mut result);

        Ok(result)
    }

    /// Standard deployment environment variables override file values.
    fn apply_standard_env_vars(config: &mut Config) {
        if let Ok(database_url) = env::var("DATABASE_URL") {
            config.database.url = Some(database_url);
        }
        if let Ok(listen_addr) = env::var("LISTEN_ADDR") {
            config.server.listen_addr = listen_addr;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.logging.level = log_level;
        }
        if let Ok(sso_url) = env::var("SSO_URL") {
            config.idp.sso_url = sso_url;
        }
        if let Ok(dev_mode) = env::var("TASKFLOW_DEV_MODE") {
            config.idp.dev_mode = matches!(dev_mode.as_str(), "1" | "true" | "yes");
        }
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.listen_addr, self.server.port)
    }

    pub fn database_url(&self) -> String {
        self.database
            .url
            .clone()
            .unwrap_or_else(|| "./taskflow.sqlite".to_string())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be non-zero");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("Database pool must allow at least one connection");
        }
        if self.idp.sso_url.is_empty() {
            anyhow::bail!("IdP sso_url must be configured");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config = Config::from_env().expect("defaults should parse");
        assert!(config.validate().is_ok());
        assert_eq!(config.sidecar.pubsub_name, "taskflow-pubsub");
    }
}
