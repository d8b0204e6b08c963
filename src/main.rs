use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use nolasms::config::Config;
use nolasms::proxy;

#[tokio::main]
async fn main() -> Result<()> {
    nolasms::init_logging();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Bind: {}", config.server.bind);
    info!("  Contacts: {}", config.contacts.len());

    proxy::run(&config).await
}
