//! Network status for a headless host.
//!
//! There is no platform API to ask, so the status comes from `config.json`
//! or the command line and stays fixed for the life of the process.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use sync_core::{NetworkMonitor, NetworkStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum NetworkKind {
    Offline,
    Wifi,
    Cellular,
    /// Wired or otherwise unmetered.
    #[default]
    Other,
}

/// The `network` section of `config.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSettings {
    #[serde(default)]
    pub kind: NetworkKind,
    /// WiFi network name, compared against `required_ssid`.
    #[serde(default)]
    pub ssid: Option<String>,
}

impl NetworkSettings {
    pub fn status(&self) -> NetworkStatus {
        match self.kind {
            NetworkKind::Offline => NetworkStatus::Offline,
            NetworkKind::Wifi => NetworkStatus::Wifi {
                ssid: self.ssid.clone(),
            },
            NetworkKind::Cellular => NetworkStatus::Cellular,
            NetworkKind::Other => NetworkStatus::Other,
        }
    }
}

/// `NetworkMonitor` that always reports the same status.
#[derive(Debug, Clone)]
pub struct StaticNetwork {
    status: NetworkStatus,
}

impl StaticNetwork {
    pub fn new(settings: &NetworkSettings) -> Self {
        Self {
            status: settings.status(),
        }
    }
}

impl NetworkMonitor for StaticNetwork {
    fn current(&self) -> NetworkStatus {
        self.status.clone()
    }
}
