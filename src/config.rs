use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use quota_gate::config::duration_str;
use quota_gate::{QuotaSettings, StoreSettings};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};

/// Top level configuration file layout.
///
/// ```yaml
/// quota:
///   key: partner-api
///   capacity: 100
///   window: 1m
/// store:
///   backend: redis
///   addr: 127.0.0.1:6379
/// fetch:
///   timeout: 10s
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub quota: QuotaSettings,
    pub store: StoreSettings,
    pub fetch: FetchSettings,
}

/// Settings for requests sent by the `fetch` command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    #[serde(with = "duration_str")]
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: format!("quota-gate/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let mut path = dirs::config_dir().context("Failed to get config directory")?;
    path.push("quota-gate");
    path.push("config.yaml");
    Ok(path)
}

/// Loads the configuration at `path`, falling back to defaults when the file
/// does not exist.
pub async fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        warn!("Config file not found, using defaults: {}", path.display());
        return Ok(Config::default());
    }

    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;

    info!("Loaded configuration from: {}", path.display());
    Ok(config)
}
