//! Applies watcher events to the note index.

use std::sync::Arc;

use sync_core::StorageManager;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::watcher::{FileEvent, FileEventKind};

/// Refresh the index row for `event.path` on its own task.
///
/// The refresh waits for the repository lock, which a running sync can
/// hold for a long time; callers in a select loop must not await it inline.
pub fn spawn_refresh(manager: Arc<StorageManager>, event: FileEvent) -> JoinHandle<()> {
    tokio::spawn(async move {
        match manager.refresh_path(&event.path).await {
            Ok(indexed) => debug!("Index refreshed for {} (indexed: {})", event.path, indexed),
            Err(e) => warn!("Failed to refresh index for {}: {}", event.path, e),
        }
        if event.kind == FileEventKind::Deleted {
            info!("Note deleted outside the app: {}", event.path);
        }
    })
}
