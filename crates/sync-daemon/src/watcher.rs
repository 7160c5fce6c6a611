//! Debounced watcher over the notes folder.
//!
//! Emits one `FileEvent` per changed note file so the daemon can refresh
//! that file's index row without a full rebuild.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use anyhow::Result;
use notes_fs::{has_note_extension, is_hidden_path};
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEvent};
use tokio::sync::mpsc;
use tracing::{debug, error};

const DEBOUNCE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    /// Path relative to the notes root, `/`-separated.
    pub path: String,
    pub kind: FileEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    /// Created or modified.
    Modified,
    Deleted,
}

/// Last seen mtime per file. Some filesystems (bind mounts, network
/// volumes) report events for files that did not change.
type MtimeCache = Arc<Mutex<HashMap<String, SystemTime>>>;

/// Filters raw paths down to note-file events.
#[derive(Debug, Clone)]
struct EventFilter {
    root: PathBuf,
    extensions: Vec<String>,
    mtimes: MtimeCache,
}

impl EventFilter {
    fn process(&self, path: &Path) -> Option<FileEvent> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let rel = relative.to_str()?.replace('\\', "/");

        // `.git` and every other dot-entry.
        if rel.is_empty() || is_hidden_path(&rel) || !has_note_extension(&rel, &self.extensions) {
            return None;
        }

        let mut mtimes = self.mtimes.lock().unwrap_or_else(|e| e.into_inner());
        let kind = match std::fs::metadata(path) {
            Ok(metadata) if metadata.is_file() => {
                if let Ok(mtime) = metadata.modified() {
                    if mtimes.get(&rel) == Some(&mtime) {
                        return None;
                    }
                    mtimes.insert(rel.clone(), mtime);
                }
                FileEventKind::Modified
            }
            Ok(_) => return None,
            Err(_) => {
                mtimes.remove(&rel);
                FileEventKind::Deleted
            }
        };

        debug!("File event: {:?} - {}", kind, rel);
        Some(FileEvent { path: rel, kind })
    }
}

/// Watches the notes root recursively.
pub struct FileWatcher {
    root: PathBuf,
    /// Dropping the debouncer stops the watch.
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
    event_rx: mpsc::UnboundedReceiver<FileEvent>,
}

impl FileWatcher {
    pub fn new(root: PathBuf, extensions: Vec<String>) -> Result<Self> {
        // FSEvents on macOS reports canonical paths (/private/var/...).
        let root = root.canonicalize().unwrap_or(root);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let filter = EventFilter {
            root: root.clone(),
            extensions,
            mtimes: Arc::new(Mutex::new(HashMap::new())),
        };

        let mut debouncer = new_debouncer(
            DEBOUNCE,
            move |result: Result<Vec<DebouncedEvent>, notify::Error>| match result {
                Ok(events) => {
                    for event in events {
                        if let Some(file_event) = filter.process(&event.path) {
                            if event_tx.send(file_event).is_err() {
                                return;
                            }
                        }
                    }
                }
                Err(e) => error!("File watcher error: {}", e),
            },
        )?;

        debouncer.watcher().watch(&root, RecursiveMode::Recursive)?;

        Ok(Self {
            root,
            _debouncer: debouncer,
            event_rx,
        })
    }

    pub fn event_rx(&mut self) -> &mut mpsc::UnboundedReceiver<FileEvent> {
        &mut self.event_rx
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn filter(root: &Path) -> EventFilter {
        EventFilter {
            root: root.to_path_buf(),
            extensions: vec!["md".to_string()],
            mtimes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[test]
    fn ignores_git_dir_and_other_files() {
        let tmp = TempDir::new().unwrap();
        let f = filter(tmp.path());
        std::fs::create_dir_all(tmp.path().join(".git")).unwrap();
        std::fs::write(tmp.path().join(".git/index"), "x").unwrap();
        std::fs::write(tmp.path().join("image.png"), "x").unwrap();

        assert_eq!(f.process(&tmp.path().join(".git/index")), None);
        assert_eq!(f.process(&tmp.path().join("image.png")), None);
        assert_eq!(f.process(Path::new("/elsewhere/a.md")), None);
    }

    #[test]
    fn reports_changes_once_per_mtime() {
        let tmp = TempDir::new().unwrap();
        let f = filter(tmp.path());
        let path = tmp.path().join("notes/a.md");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "a").unwrap();

        assert_eq!(
            f.process(&path),
            Some(FileEvent {
                path: "notes/a.md".to_string(),
                kind: FileEventKind::Modified
            })
        );
        // Same mtime again: spurious.
        assert_eq!(f.process(&path), None);

        std::fs::remove_file(&path).unwrap();
        assert_eq!(
            f.process(&path),
            Some(FileEvent {
                path: "notes/a.md".to_string(),
                kind: FileEventKind::Deleted
            })
        );
    }
}
