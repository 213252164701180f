//! Configuration for the hublink client
//!
//! Configuration lives in a single TOML file. The `ConfigManager` loads it,
//! writing a default file on first run so users have something to edit.
//!
//! # Example
//!
//! ```rust,no_run
//! use hublink::config::ConfigManager;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = ConfigManager::new(None)?;
//!     println!("Hub URL: {}", manager.config().hub.hub_url);
//!     Ok(())
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub toasts: ToastConfig,
    #[serde(default)]
    pub push: PushConfig,
}

/// Hub connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Hub endpoint. http(s) schemes are mapped to ws(s) by the transport.
    pub hub_url: String,
    /// Wallet group to join on connect; the universal group is always joined.
    pub wallet_guid: Option<String>,
    /// Outer connect-retry cap (initial connect failures only).
    pub max_connect_attempts: u32,
    /// Base delay for the outer retry loop; the actual delay scales with the
    /// attempt count.
    pub connect_retry_delay_ms: u64,
    /// Inner (post-connect drop) reconnect: exponential base delay.
    pub reconnect_base_delay_ms: u64,
    /// Inner reconnect delay cap.
    pub reconnect_max_delay_ms: u64,
    /// Inner reconnect attempt cap.
    pub max_reconnect_attempts: u32,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            hub_url: "https://website.admin.solutions/signalrUniversalHub".to_string(),
            wallet_guid: None,
            max_connect_attempts: 5,
            connect_retry_delay_ms: 3000,
            reconnect_base_delay_ms: 1000,
            reconnect_max_delay_ms: 30_000,
            max_reconnect_attempts: 5,
        }
    }
}

/// Persisted notification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Maximum remembered notifications; oldest dropped first on overflow.
    pub max_stored: usize,
    /// Entries older than this are discarded on load.
    pub retention_days: i64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            max_stored: 50,
            retention_days: 7,
        }
    }
}

/// Toast settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToastConfig {
    /// Auto-dismiss delay when a toast does not specify one. Zero would make
    /// every toast sticky.
    pub default_duration_ms: u64,
}

impl Default for ToastConfig {
    fn default() -> Self {
        Self {
            default_duration_ms: 4000,
        }
    }
}

/// Push subscription registration settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PushConfig {
    /// Membership API base URL; push registration is disabled when unset.
    pub api_base_url: Option<String>,
}

/// Loads and persists the configuration file.
pub struct ConfigManager {
    config_path: PathBuf,
    config: Config,
}

impl ConfigManager {
    /// Load configuration from `path`, or from the default location
    /// (`~/.hublink/config.toml`) when `None`. A missing file is created
    /// with defaults.
    pub fn new(path: Option<PathBuf>) -> AppResult<Self> {
        let config_path = match path {
            Some(p) => p,
            None => Self::default_path()?,
        };
        let config = Self::load_or_create(&config_path)?;
        Ok(ConfigManager {
            config_path,
            config,
        })
    }

    /// Access the loaded configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Mutable access, for applying CLI overrides before the service starts
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Path of the file this manager reads and writes
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Persist the current configuration back to disk
    pub fn save(&self) -> AppResult<()> {
        let contents = toml::to_string_pretty(&self.config)
            .map_err(|e| AppError::config_with_source("Failed to serialize configuration", e))?;
        fs::write(&self.config_path, contents).map_err(|e| AppError::Io {
            path: self.config_path.clone(),
            operation: "write configuration".to_string(),
            source: Some(Box::new(e)),
        })
    }

    fn default_path() -> AppResult<PathBuf> {
        let base = directories::BaseDirs::new()
            .ok_or_else(|| AppError::config("Could not determine home directory"))?;
        Ok(base.home_dir().join(".hublink").join("config.toml"))
    }

    fn load_or_create(path: &Path) -> AppResult<Config> {
        if path.exists() {
            let contents = fs::read_to_string(path).map_err(|e| AppError::Io {
                path: path.to_path_buf(),
                operation: "read configuration".to_string(),
                source: Some(Box::new(e)),
            })?;
            let config: Config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| AppError::Io {
                    path: parent.to_path_buf(),
                    operation: "create configuration directory".to_string(),
                    source: Some(Box::new(e)),
                })?;
            }
            let config = Config::default();
            let contents = toml::to_string_pretty(&config).map_err(|e| {
                AppError::config_with_source("Failed to serialize default configuration", e)
            })?;
            fs::write(path, contents).map_err(|e| AppError::Io {
                path: path.to_path_buf(),
                operation: "write default configuration".to_string(),
                source: Some(Box::new(e)),
            })?;
            Ok(config)
        }
    }
}
