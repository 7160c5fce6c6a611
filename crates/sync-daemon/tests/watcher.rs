//! File watcher tests against a real directory.

use std::time::Duration;

use sync_daemon::{FileEventKind, FileWatcher};
use tempfile::TempDir;
use tokio::time::timeout;

fn md() -> Vec<String> {
    vec!["md".to_string()]
}

/// Test that writing a note produces a Modified event.
#[tokio::test]
async fn test_file_watcher_detects_note_changes() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path().to_path_buf();

    let mut watcher = FileWatcher::new(root.clone(), md()).expect("Failed to create watcher");

    // Give the watcher time to initialize - FSEvents on macOS needs time
    tokio::time::sleep(Duration::from_millis(500)).await;

    let note = root.join("test.md");
    std::fs::write(&note, "# Hello").expect("Failed to write file");
    tokio::time::sleep(Duration::from_millis(100)).await;
    std::fs::write(&note, "# Hello World").expect("Failed to modify file");

    let event = timeout(Duration::from_secs(10), watcher.event_rx().recv())
        .await
        .expect("Timeout waiting for file event")
        .expect("No event received");

    assert_eq!(event.path, "test.md");
    assert_eq!(event.kind, FileEventKind::Modified);
}

/// Test that `.git` and non-note files are never reported.
#[tokio::test]
async fn test_file_watcher_ignores_git_and_other_files() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path().to_path_buf();
    let git_dir = root.join(".git");
    std::fs::create_dir_all(&git_dir).expect("Failed to create .git dir");

    let mut watcher = FileWatcher::new(root.clone(), md()).expect("Failed to create watcher");
    tokio::time::sleep(Duration::from_millis(500)).await;

    std::fs::write(git_dir.join("index.md"), "x").expect("Failed to write git file");
    std::fs::write(root.join("picture.png"), "x").expect("Failed to write png");

    tokio::time::sleep(Duration::from_millis(200)).await;
    let note = root.join("journal.md");
    std::fs::write(&note, "# Journal").expect("Failed to write file");
    tokio::time::sleep(Duration::from_millis(100)).await;
    std::fs::write(&note, "# Journal\n\nentry").expect("Failed to modify file");

    let event = timeout(Duration::from_secs(10), watcher.event_rx().recv())
        .await
        .expect("Timeout waiting for file event")
        .expect("No event received");

    assert_eq!(event.path, "journal.md");
}

/// Test that removing a note produces a Deleted event.
#[tokio::test]
async fn test_file_watcher_detects_deletion() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path().to_path_buf();
    let note = root.join("gone.md");
    std::fs::write(&note, "# Gone").expect("Failed to write file");

    let mut watcher = FileWatcher::new(root.clone(), md()).expect("Failed to create watcher");
    tokio::time::sleep(Duration::from_millis(500)).await;

    std::fs::remove_file(&note).expect("Failed to remove file");

    let event = timeout(Duration::from_secs(10), watcher.event_rx().recv())
        .await
        .expect("Timeout waiting for file event")
        .expect("No event received");

    assert_eq!(event.path, "gone.md");
    assert_eq!(event.kind, FileEventKind::Deleted);
}
