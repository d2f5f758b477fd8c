use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::orchestrator::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server_url: String,
    /// Page a display opens; the session id is appended as a query.
    pub share_base_url: String,
    pub stun_servers: Vec<String>,
    pub connect_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub max_retries: u32,
    pub retry_interval_ms: u64,
    pub offer_timeout_ms: u64,
    pub channel_label: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "wss://owd.acecentre.net".to_string(),
            share_base_url: "https://owd.acecentre.net/".to_string(),
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            connect_timeout_ms: 10_000,
            poll_interval_ms: 500,
            max_retries: 3,
            retry_interval_ms: 5_000,
            offer_timeout_ms: 15_000,
            channel_label: "messaging".to_string(),
        }
    }
}

impl Config {
    fn get_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "clipcast")
            .map(|proj_dirs| proj_dirs.config_dir().join("config.json"))
    }

    pub fn load() -> Self {
        tracing::info!("Loading config");
        if let Some(config) = Self::get_config_path().and_then(|path| Self::read_from(&path)) {
            return config;
        }

        tracing::info!("No config file could be loaded, using default config.");
        let default = Self::default();
        if let Err(e) = default.save() {
            tracing::error!("Failed to save default config: {}", e);
        }
        default
    }

    fn read_from(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }
        match fs::read(path) {
            Ok(content) => match serde_json::from_slice(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    tracing::error!("Failed to parse config file: {}", e);
                    None
                }
            },
            Err(e) => {
                tracing::error!("Failed to read config file: {}", e);
                None
            }
        }
    }

    pub fn save(&self) -> std::io::Result<()> {
        match Self::get_config_path() {
            Some(path) => self.write_to(&path),
            None => Ok(()),
        }
    }

    fn write_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            interval: Duration::from_millis(self.retry_interval_ms),
            offer_timeout: Duration::from_millis(self.offer_timeout_ms),
        }
    }
}
