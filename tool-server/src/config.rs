use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::env;
use taskflow_auth::IdpConfig;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub api: ApiSettings,
    pub idp: IdpSettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub port: u16,
}

/// REST API backend the tools call into.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiSettings {
    pub url: String,
    /// Outbound request timeout in seconds
    pub request_timeout: u64,
}

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

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mut builder = ConfigBuilder::builder().add_source(File::from_str(
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
            Environment::with_prefix("TASKFLOW_MCP")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;
        let mut result: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        if let Ok(api_url) = env::var("API_URL") {
            result.api.url = api_url;
        }
        if let Ok(sso_url) = env::var("SSO_URL") {
            result.idp.sso_url = sso_url;
        }
        if let Ok(dev_mode) = env::var("TASKFLOW_DEV_MODE") {
            result.idp.dev_mode = matches!(dev_mode.as_str(), "1" | "true" | "yes");
        }

        Ok(result)
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.listen_addr, self.server.port)
    }

    /// The resource URI advertised in protected-resource metadata.
    pub fn resource_url(&self) -> String {
        format!("http://{}/mcp", self.server_address())
    }
}
