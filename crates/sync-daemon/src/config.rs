//! Daemon configuration: `config.json` in the config directory, plus the
//! default directories for data and state.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sync_core::{StorageConfiguration, SyncSettings};

use crate::network::NetworkSettings;

const APP_DIR_NAME: &str = "gitnotes";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Notes folder on the device. Unset keeps the repository in the data
    /// directory.
    #[serde(default)]
    pub notes_dir: Option<PathBuf>,

    /// Remote, interval, network policy and commit settings.
    #[serde(default)]
    pub sync: SyncSettings,

    /// What this host reports as its network connection.
    #[serde(default)]
    pub network: NetworkSettings,

    /// Seconds between checks in `run` mode.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            notes_dir: None,
            sync: SyncSettings::default(),
            network: NetworkSettings::default(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl Config {
    /// Load `config.json` from `config_dir`, writing the defaults there on
    /// first run.
    pub fn load(config_dir: &Path) -> Result<Self> {
        let config_file = config_dir.join("config.json");

        if config_file.exists() {
            let content = std::fs::read_to_string(&config_file)
                .with_context(|| format!("Failed to read config file: {:?}", config_file))?;
            let config: Config = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {:?}", config_file))?;
            tracing::info!("Loaded configuration from {:?}", config_file);
            Ok(config)
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_file);
            let config = Config::default();

            std::fs::create_dir_all(config_dir)
                .with_context(|| format!("Failed to create config directory: {:?}", config_dir))?;
            let content = serde_json::to_string_pretty(&config)?;
            std::fs::write(&config_file, content)
                .with_context(|| format!("Failed to write default config: {:?}", config_file))?;
            tracing::info!("Created default config at {:?}", config_file);

            Ok(config)
        }
    }

    pub fn storage(&self) -> StorageConfiguration {
        match &self.notes_dir {
            Some(dir) => StorageConfiguration::Device(expand_tilde(dir)),
            None => StorageConfiguration::App,
        }
    }
}

/// `~/.config/gitnotes` or the platform equivalent.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// `~/.local/share/gitnotes` or the platform equivalent.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}
