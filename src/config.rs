use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::contacts::{default_contacts, Contact};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_server_config")]
    pub server: ServerConfig,
    #[serde(default = "default_dispatch_config")]
    pub dispatch: DispatchConfig,
    #[serde(default = "default_webhook_config")]
    pub webhook: WebhookConfig,
    #[serde(default = "default_history_config")]
    pub history: HistoryConfig,
    #[serde(default = "default_contacts")]
    pub contacts: Vec<Contact>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

/// Where the dispatch client sends messages, and as whom.
#[derive(Debug, Deserialize, Clone)]
pub struct DispatchConfig {
    #[serde(default = "default_proxy_url")]
    pub proxy_url: String,
    #[serde(default = "default_sender_name")]
    pub sender_name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    #[serde(default = "default_webhook_url")]
    pub url: String,
    /// Used when a relayed request carries no `sendername`.
    #[serde(default = "default_sender_name")]
    pub default_sender_name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_proxy_url() -> String {
    "http://127.0.0.1:3000/api/sms".to_string()
}

pub fn default_sender_name() -> String {
    "NOLACRM".to_string()
}

fn default_webhook_url() -> String {
    "https://webhooks.nolacrm.io/webhook/send_sms.php".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("nolasms.db")
}

fn default_server_config() -> ServerConfig {
    ServerConfig {
        bind: default_bind(),
    }
}

pub fn default_dispatch_config() -> DispatchConfig {
    DispatchConfig {
        proxy_url: default_proxy_url(),
        sender_name: default_sender_name(),
    }
}

pub fn default_webhook_config() -> WebhookConfig {
    WebhookConfig {
        url: default_webhook_url(),
        default_sender_name: default_sender_name(),
    }
}

fn default_history_config() -> HistoryConfig {
    HistoryConfig {
        database_path: default_db_path(),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: default_server_config(),
            dispatch: default_dispatch_config(),
            webhook: default_webhook_config(),
            history: default_history_config(),
            contacts: default_contacts(),
        }
    }
}

impl Config {
    /// Load the config file, or fall back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!(
                "Config file {} not found, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}
