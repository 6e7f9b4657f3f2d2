use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8000";

const APP_DIR: &str = "refuge-first";

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the HTTP auth API
    pub api_url: Option<String>,
    /// Base URL of the chat WebSocket (`/ws/<session id>` is appended)
    pub ws_url: Option<String>,
    /// Use local mock accounts when the auth API cannot be reached
    pub local_auth_fallback: Option<bool>,
    /// Seconds to wait for a reply before showing a "no response" message
    pub reply_timeout_secs: Option<u64>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            api_url: None,
            ws_url: None,
            local_auth_fallback: Some(true),
            reply_timeout_secs: None,
        }
    }

    /// Load from the default location, then apply `REFUGE_API_URL` / `REFUGE_WS_URL`
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::get_config_path()?)?;

        if let Ok(url) = std::env::var("REFUGE_API_URL") {
            config.api_url = Some(url);
        }
        if let Ok(url) = std::env::var("REFUGE_WS_URL") {
            config.ws_url = Some(url);
        }

        Ok(config)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(config_path, config_content)?;
        Ok(())
    }

    pub fn api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }

    pub fn ws_url(&self) -> &str {
        self.ws_url.as_deref().unwrap_or(DEFAULT_WS_URL)
    }

    pub fn local_auth_fallback(&self) -> bool {
        self.local_auth_fallback.unwrap_or(true)
    }

    pub fn reply_timeout(&self) -> Option<std::time::Duration> {
        self.reply_timeout_secs
            .filter(|secs| *secs > 0)
            .map(std::time::Duration::from_secs)
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join(APP_DIR).join("config.json"))
    }

    /// Directory for session state, mock accounts and the log file
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow!("Could not determine data directory"))?;

        Ok(data_dir.join(APP_DIR))
    }
}
