//! Background sync scheduling: interval and network gates, plus the single
//! live background task.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::storage::StorageManager;

/// Current connectivity as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkStatus {
    Offline,
    Wifi { ssid: Option<String> },
    Cellular,
    /// Ethernet, VPN or anything else that is neither WiFi nor metered.
    Other,
}

/// Source of `NetworkStatus`. Platforms plug in their own.
pub trait NetworkMonitor: Send + Sync {
    fn current(&self) -> NetworkStatus;
}

/// When a background sync may use the network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkPolicy {
    #[serde(default)]
    pub sync_only_on_wifi: bool,
    #[serde(default)]
    pub sync_on_specific_wifi: bool,
    #[serde(default)]
    pub required_ssid: Option<String>,
}

impl NetworkPolicy {
    /// Without `sync_only_on_wifi` every status is permitted, offline
    /// included: a local-only cycle needs no network and a failed fetch
    /// surfaces as `NetworkUnavailable`.
    pub fn permits(&self, status: &NetworkStatus) -> bool {
        if !self.sync_only_on_wifi {
            return true;
        }

        let ssid = match status {
            NetworkStatus::Wifi { ssid } => ssid.as_deref(),
            _ => return false,
        };

        match self.required_ssid.as_deref() {
            Some(required) if self.sync_on_specific_wifi && !required.is_empty() => {
                ssid == Some(required)
            }
            _ => true,
        }
    }
}

/// Both gates: enough time since `last_sync_at` and a permitted network.
///
/// A `last_sync_at` in the future (clock moved back) counts as elapsed.
pub fn should_sync(
    now: DateTime<Utc>,
    last_sync_at: Option<DateTime<Utc>>,
    min_interval: Duration,
    policy: &NetworkPolicy,
    network: &NetworkStatus,
) -> bool {
    interval_elapsed(now, last_sync_at, min_interval) && policy.permits(network)
}

fn interval_elapsed(
    now: DateTime<Utc>,
    last_sync_at: Option<DateTime<Utc>>,
    min_interval: Duration,
) -> bool {
    let Some(last) = last_sync_at else {
        return true;
    };
    let elapsed = now.signed_duration_since(last);
    if elapsed < chrono::TimeDelta::zero() {
        return true;
    }
    elapsed.to_std().map_or(true, |e| e >= min_interval)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    TooSoon,
    NetworkNotPermitted,
}

/// What a scheduling request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleDecision {
    Spawned,
    AlreadyRunning,
    Skipped(SkipReason),
}

/// Owns at most one background `perform_background_git_operations` task.
pub struct BackgroundScheduler {
    manager: Arc<StorageManager>,
    monitor: Arc<dyn NetworkMonitor>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundScheduler {
    pub fn new(manager: Arc<StorageManager>, monitor: Arc<dyn NetworkMonitor>) -> Self {
        Self {
            manager,
            monitor,
            task: Mutex::new(None),
        }
    }

    /// Called once when the app starts.
    pub fn on_app_start(&self) -> ScheduleDecision {
        self.sync_if_due()
    }

    /// Start a background cycle if the interval and network gates allow it.
    pub fn sync_if_due(&self) -> ScheduleDecision {
        let settings = self.manager.settings();
        let min_interval = Duration::from_secs(settings.min_sync_interval_secs);
        if !interval_elapsed(Utc::now(), self.manager.last_sync_at(), min_interval) {
            debug!("Skipping background sync: last sync too recent");
            return ScheduleDecision::Skipped(SkipReason::TooSoon);
        }
        self.spawn_if_permitted()
    }

    /// Start a background cycle now, subject only to the network gate.
    pub fn sync_now(&self) -> ScheduleDecision {
        self.spawn_if_permitted()
    }

    fn spawn_if_permitted(&self) -> ScheduleDecision {
        let status = self.monitor.current();
        if !self.manager.settings().network.permits(&status) {
            debug!("Skipping background sync: network {:?} not permitted", status);
            return ScheduleDecision::Skipped(SkipReason::NetworkNotPermitted);
        }

        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.as_ref().is_some_and(|handle| !handle.is_finished())
            || self.manager.sync_state().is_running()
        {
            return ScheduleDecision::AlreadyRunning;
        }

        let manager = Arc::clone(&self.manager);
        *task = Some(tokio::spawn(async move {
            match manager.perform_background_git_operations().await {
                Ok(report) => info!("Background sync complete: {:?}", report.sync),
                Err(crate::StorageError::SyncInProgress) => {
                    debug!("Background sync skipped: another sync is running")
                }
                Err(e) => warn!("Background sync failed: {}", e),
            }
        }));
        ScheduleDecision::Spawned
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Wait for the live task, if any, to finish on its own.
    pub async fn wait_idle(&self) {
        let handle = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Background sync task failed: {}", e);
            }
        }
    }

    /// Cancel the live task and wait for it to stop.
    pub async fn shutdown(&self) {
        let handle = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            self.manager.cancel_current();
            if let Err(e) = handle.await {
                warn!("Background sync task failed: {}", e);
            }
            self.manager.wait_idle().await;
            self.manager.clear_cancel();
        }
    }
}
