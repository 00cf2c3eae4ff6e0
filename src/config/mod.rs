use crate::backend::DEFAULT_SAMPLE_RATE;
use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

const API_KEY_ENV: &str = "RETELL_API_KEY";
const DEBUG_ENV: &str = "DEBUG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub call: CallConfig,
    pub server: ServerConfig,
}

/// Where the session controller provisions calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub url: String,
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    pub default_sample_rate: u32,
    /// How long the "call ended" state is shown before returning to idle.
    pub reset_delay_ms: u64,
    /// Give up on a start attempt after this long. Unset waits indefinitely.
    pub connect_timeout_secs: Option<u64>,
    /// Input device name; the system default is used when unset.
    pub capture_device: Option<String>,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            default_sample_rate: DEFAULT_SAMPLE_RATE,
            reset_delay_ms: 2000,
            connect_timeout_secs: None,
            capture_device: None,
        }
    }
}

/// Settings for `webcall serve`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Voice platform API key. `RETELL_API_KEY` takes precedence.
    pub api_key: Option<String>,
    pub platform_url: String,
    pub cors_origins: Vec<String>,
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            api_key: None,
            platform_url: "https://api.retellai.com".to_string(),
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
            debug: false,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The API key, if one is set and non-blank.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|key| !key.trim().is_empty())
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        let mut config = Self::load_from(&config_path)?;
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Load from `path`, writing the defaults there first if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("Config file not found, creating default at {:?}", path);
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path).context("Failed to read config file")?;
        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(API_KEY_ENV).filter(|key| !key.trim().is_empty()) {
            self.server.api_key = Some(key);
        }

        if let Some(value) = lookup(DEBUG_ENV) {
            match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.server.debug = true,
                "0" | "false" | "no" | "" => self.server.debug = false,
                other => warn!("Ignoring unrecognized {} value: {}", DEBUG_ENV, other),
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}
