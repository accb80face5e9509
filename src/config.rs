//! # Configuration File
//!
//! Loads and stores the `config.toml` that drives the binary: session tuning
//! under `[session]` and the broker profile under `[broker]`.
//!
//! Missing files are created with defaults by [`AppConfig::ensure_default`]; missing
//! keys fall back to their defaults when parsing, so older files keep loading.

use crate::mqtt::{config::MqttConfig, params::ConnectionParameters};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = "mqtt-session";
const CONFIG_FILE: &str = "config.toml";

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "MQTT_SESSION_CONFIG";

/// Broker to connect to and what to do once connected
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct BrokerProfile {
    pub host: String,
    pub port: String,
    pub client_id: String,
    pub username: String,
    pub password: String,
    /// Topic filters subscribed right after connecting
    pub subscriptions: Vec<String>,
    /// Topic that receives a short online notice after connecting
    pub announce_topic: Option<String>,
}

impl Default for BrokerProfile {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: "1883".to_string(),
            client_id: "mqtt-session".to_string(),
            username: String::new(),
            password: String::new(),
            subscriptions: vec!["#".to_string()],
            announce_topic: None,
        }
    }
}

impl BrokerProfile {
    pub fn parameters(&self) -> ConnectionParameters {
        ConnectionParameters::new(
            self.host.clone(),
            self.port.clone(),
            self.client_id.clone(),
            self.username.clone(),
            self.password.clone(),
        )
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub session: MqttConfig,
    pub broker: BrokerProfile,
}

impl AppConfig {
    /// `$MQTT_SESSION_CONFIG`, else `<config dir>/mqtt-session/config.toml`
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }
        let mut path = dirs::config_dir().ok_or_else(|| eyre!("No config directory available"))?;
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        Ok(path)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| eyre!("Failed to serialize config: {}", e))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| eyre!("Failed to write config file: {}", e))?;

        info!("Config saved to {}", path.display());
        Ok(())
    }

    /// Fails with a report naming `path` when the broker profile is incomplete.
    pub fn check_broker(&self, path: &Path) -> Result<()> {
        self.broker
            .parameters()
            .validate()
            .map_err(|e| eyre!("{}, set it under [broker] in {}", e, path.display()))
    }

    /// Writes a default config if `path` does not exist yet, then loads it.
    pub async fn ensure_default(path: &Path) -> Result<Self> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?;

        if !exists {
            warn!(
                "Config file {} does not exist, creating default",
                path.display()
            );
            AppConfig::default().save(path).await?;
        }

        Self::load(path).await
    }
}
