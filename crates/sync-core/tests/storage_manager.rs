//! `StorageManager` and `BackgroundScheduler` against real repositories in
//! temp directories.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use git2::{Repository, RepositoryInitOptions};
use sync_core::{
    BackgroundScheduler, CommitOutcome, GitError, NetworkMonitor, NetworkPolicy, NetworkStatus,
    Note, OpenOutcome, RemoteConfig, ScheduleDecision, SkipReason, StorageConfiguration,
    StorageError, StorageEvent, StorageManager, SyncOutcome, SyncSettings,
};
use tempfile::TempDir;

fn manager_with(tmp: &TempDir, name: &str, settings: SyncSettings) -> StorageManager {
    StorageManager::new(
        tmp.path().join(name).join("app"),
        tmp.path().join(name).join("state"),
        settings,
    )
}

async fn open_app(tmp: &TempDir) -> StorageManager {
    let manager = manager_with(tmp, "m", SyncSettings::default());
    manager.open_repo(StorageConfiguration::App).await.unwrap();
    manager
}

/// Note files on disk, relative to `root`, skipping `.git`.
fn note_files(root: &Path) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.file_name().is_some_and(|n| n == ".git") {
                continue;
            }
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|e| e == "md") {
                let rel = path.strip_prefix(root).unwrap();
                found.insert(rel.to_string_lossy().replace('\\', "/"));
            }
        }
    }
    found
}

async fn assert_index_matches_disk(manager: &StorageManager) {
    let root = manager.current_root().await.unwrap();
    let indexed: BTreeSet<String> = manager.indexed_paths().await.unwrap().into_iter().collect();
    assert_eq!(indexed, note_files(&root));
}

#[tokio::test]
async fn index_follows_note_operations() {
    let tmp = TempDir::new().unwrap();
    let manager = open_app(&tmp).await;

    manager.create_note("inbox/first.md", "# First\n").await.unwrap();
    manager.create_note("second.md", "# Second\n").await.unwrap();
    assert_index_matches_disk(&manager).await;

    manager.update_database(true).await.unwrap();
    let first = manager.read_note("inbox/first.md").await.unwrap();
    let renamed = Note::new("archive/first.md", "# First\nmoved\n");
    manager.update_note(&renamed, &first).await.unwrap();
    assert_index_matches_disk(&manager).await;

    manager.delete_note("second.md").await.unwrap();
    manager.create_note("third.md", "# Third\n").await.unwrap();
    assert_index_matches_disk(&manager).await;

    manager.update_database(true).await.unwrap();
    assert_index_matches_disk(&manager).await;
    assert_eq!(
        manager.indexed_paths().await.unwrap(),
        vec!["archive/first.md".to_string(), "third.md".to_string()]
    );
}

#[tokio::test]
async fn stale_expected_content_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let manager = open_app(&tmp).await;

    let original = manager.create_note("note.md", "v1").await.unwrap();
    let v2 = manager
        .update_note(&Note::new("note.md", "v2"), &original)
        .await
        .unwrap();
    assert_eq!(v2.content, "v2");

    // `original` is now stale.
    let err = manager
        .update_note(&Note::new("note.md", "v3"), &original)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::OptimisticConflict { ref path, .. } if path == "note.md"));
    assert_eq!(manager.read_note("note.md").await.unwrap().content, "v2");
}

#[tokio::test]
async fn create_and_delete_report_missing_or_taken_paths() {
    let tmp = TempDir::new().unwrap();
    let manager = open_app(&tmp).await;

    manager.create_note("a.md", "a").await.unwrap();
    assert!(matches!(
        manager.create_note("a.md", "again").await,
        Err(StorageError::AlreadyExists { .. })
    ));
    assert!(matches!(
        manager.delete_note("missing.md").await,
        Err(StorageError::NotFound { .. })
    ));
    assert!(matches!(
        manager.read_note("missing.md").await,
        Err(StorageError::NotFound { .. })
    ));
}

#[tokio::test]
async fn second_incremental_update_is_a_no_op() {
    let tmp = TempDir::new().unwrap();
    let manager = open_app(&tmp).await;
    manager.create_note("a.md", "a").await.unwrap();

    assert!(manager.update_database(false).await.unwrap());
    assert!(!manager.update_database(false).await.unwrap());
    assert!(manager.last_sync_at().is_some());

    // An edit behind the manager's back is picked up by the next check.
    let root = manager.current_root().await.unwrap();
    fs::write(root.join("outside.md"), "# Outside\n").unwrap();
    assert!(manager.update_database(false).await.unwrap());
    assert_index_matches_disk(&manager).await;
}

#[tokio::test]
async fn search_and_list_use_the_index() {
    let tmp = TempDir::new().unwrap();
    let manager = open_app(&tmp).await;
    manager
        .create_note("recipes/bread.md", "---\ntags: [baking]\n---\n# Sourdough\n")
        .await
        .unwrap();
    manager.create_note("todo.md", "buy flour").await.unwrap();

    let hits = manager.search_notes("flour", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].path, "todo.md");

    let listed = manager.list_notes("recipes").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title.as_deref(), Some("Sourdough"));
}

#[tokio::test]
async fn discard_restores_committed_state() {
    let tmp = TempDir::new().unwrap();
    let manager = open_app(&tmp).await;

    manager.create_note("assets/a.md", "committed").await.unwrap();
    manager.create_note("keep.md", "committed").await.unwrap();
    assert!(matches!(
        manager.commit_all("initial").await.unwrap(),
        CommitOutcome::Committed { .. }
    ));

    let a = manager.read_note("assets/a.md").await.unwrap();
    manager
        .update_note(&Note::new("assets/a.md", "scribbled"), &a)
        .await
        .unwrap();
    manager.create_note("assets/new.md", "untracked").await.unwrap();
    let keep = manager.read_note("keep.md").await.unwrap();
    manager
        .update_note(&Note::new("keep.md", "kept edit"), &keep)
        .await
        .unwrap();

    manager.discard_changes("assets").await.unwrap();

    assert_eq!(manager.read_note("assets/a.md").await.unwrap().content, "committed");
    assert!(matches!(
        manager.read_note("assets/new.md").await,
        Err(StorageError::NotFound { .. })
    ));
    assert_eq!(manager.read_note("keep.md").await.unwrap().content, "kept edit");
    assert_index_matches_disk(&manager).await;
    assert_eq!(manager.uncommitted_paths().await.unwrap(), vec!["keep.md".to_string()]);
}

#[tokio::test]
async fn background_cycle_commits_and_rebuilds() {
    let tmp = TempDir::new().unwrap();
    let manager = open_app(&tmp).await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let _sub = {
        let seen = Arc::clone(&seen);
        manager
            .events()
            .subscribe(move |event| seen.lock().unwrap().push(event))
    };

    manager.create_note("a.md", "a").await.unwrap();
    let report = manager.perform_background_git_operations().await.unwrap();

    assert!(matches!(report.commit, Some(CommitOutcome::Committed { .. })));
    assert_eq!(report.sync, SyncOutcome::LocalOnly);
    assert_eq!(report.index.indexed, 1);
    assert!(manager.uncommitted_paths().await.unwrap().is_empty());
    assert_eq!(
        manager.last_commit().await.unwrap().unwrap().summary,
        "Automatic commit from gitnotes"
    );
    assert!(manager.last_sync_at().is_some());
    assert!(manager.sync_state().last_completed_at.is_some());

    // Nothing left to commit on the next cycle.
    let report = manager.perform_background_git_operations().await.unwrap();
    assert_eq!(report.commit, None);

    let events = seen.lock().unwrap().clone();
    assert!(events.contains(&StorageEvent::NoteCreated { path: "a.md".into() }));
    assert!(events.contains(&StorageEvent::SyncStarted));
    assert!(events.contains(&StorageEvent::SyncFinished { error: None }));
    assert!(events.contains(&StorageEvent::IndexRebuilt { notes: 1, skipped: 0 }));
}

#[tokio::test]
async fn close_releases_the_repository() {
    let tmp = TempDir::new().unwrap();
    let manager = open_app(&tmp).await;
    manager.create_note("a.md", "a").await.unwrap();

    manager.close_repo().await;
    assert!(manager.current_root().await.is_none());
    assert!(matches!(
        manager.read_note("a.md").await,
        Err(StorageError::RepoNotOpen)
    ));

    assert_eq!(
        manager.open_repo(StorageConfiguration::App).await.unwrap(),
        OpenOutcome::Opened
    );
    assert_eq!(manager.read_note("a.md").await.unwrap().content, "a");
}

#[tokio::test]
async fn device_storage_needs_a_writable_parent() {
    let tmp = TempDir::new().unwrap();
    let manager = manager_with(&tmp, "m", SyncSettings::default());

    let missing_parent = tmp.path().join("nope").join("notes");
    assert!(matches!(
        manager
            .open_repo(StorageConfiguration::Device(missing_parent))
            .await,
        Err(StorageError::ParentNotWritable(_))
    ));

    let notes = tmp.path().join("notes");
    assert_eq!(
        manager
            .open_repo(StorageConfiguration::Device(notes.clone()))
            .await
            .unwrap(),
        OpenOutcome::Initialized
    );
    assert_eq!(manager.current_root().await, Some(notes));
}

#[tokio::test]
async fn clone_picks_up_notes_from_another_device() {
    let tmp = TempDir::new().unwrap();
    let remote_path = tmp.path().join("remote.git");
    let mut opts = RepositoryInitOptions::new();
    opts.bare(true).initial_head("main");
    Repository::init_opts(&remote_path, &opts).unwrap();

    let settings = SyncSettings {
        remote: Some(RemoteConfig {
            url: Some(remote_path.to_string_lossy().into_owned()),
            ..Default::default()
        }),
        ..Default::default()
    };

    let phone = manager_with(&tmp, "phone", settings.clone());
    phone.open_repo(StorageConfiguration::App).await.unwrap();
    phone.create_note("shared.md", "# Shared\nhello").await.unwrap();
    let report = phone.perform_background_git_operations().await.unwrap();
    assert!(matches!(report.sync, SyncOutcome::Pushed { .. }));

    let laptop = manager_with(&tmp, "laptop", settings);
    let outcome = laptop
        .clone_repo(
            StorageConfiguration::App,
            &remote_path.to_string_lossy(),
        )
        .await
        .unwrap();
    assert_eq!(outcome, OpenOutcome::Cloned);
    assert_eq!(laptop.read_note("shared.md").await.unwrap().content, "# Shared\nhello");
    assert_eq!(laptop.search_notes("hello", 5).await.unwrap().len(), 1);

    // A later edit on the phone reaches the laptop through `sync`.
    let shared = phone.read_note("shared.md").await.unwrap();
    phone
        .update_note(&Note::new("shared.md", "# Shared\nupdated"), &shared)
        .await
        .unwrap();
    phone.perform_background_git_operations().await.unwrap();

    assert!(matches!(
        laptop.sync().await.unwrap(),
        SyncOutcome::FastForwarded { .. }
    ));
    assert_eq!(laptop.read_note("shared.md").await.unwrap().content, "# Shared\nupdated");
    assert_eq!(laptop.search_notes("updated", 5).await.unwrap().len(), 1);
}

struct FixedNetwork(NetworkStatus);

impl NetworkMonitor for FixedNetwork {
    fn current(&self) -> NetworkStatus {
        self.0.clone()
    }
}

#[tokio::test]
async fn scheduler_respects_interval_and_network() {
    let tmp = TempDir::new().unwrap();
    let settings = SyncSettings {
        network: NetworkPolicy {
            sync_only_on_wifi: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let manager = Arc::new(manager_with(&tmp, "m", settings));
    manager.open_repo(StorageConfiguration::App).await.unwrap();
    manager.create_note("a.md", "a").await.unwrap();

    let on_cellular = BackgroundScheduler::new(
        Arc::clone(&manager),
        Arc::new(FixedNetwork(NetworkStatus::Cellular)),
    );
    assert_eq!(
        on_cellular.on_app_start(),
        ScheduleDecision::Skipped(SkipReason::NetworkNotPermitted)
    );

    let on_wifi = BackgroundScheduler::new(
        Arc::clone(&manager),
        Arc::new(FixedNetwork(NetworkStatus::Wifi {
            ssid: Some("home".to_string()),
        })),
    );
    assert_eq!(on_wifi.on_app_start(), ScheduleDecision::Spawned);
    on_wifi.wait_idle().await;
    assert!(manager.last_commit().await.unwrap().is_some());
    assert!(manager.last_sync_at().is_some());

    // Synced moments ago; the default interval holds the next start back.
    assert_eq!(
        on_wifi.on_app_start(),
        ScheduleDecision::Skipped(SkipReason::TooSoon)
    );
    // `sync_now` skips the interval gate only.
    assert_eq!(on_wifi.sync_now(), ScheduleDecision::Spawned);
    on_wifi.shutdown().await;
    assert!(!on_wifi.is_running());
    assert_eq!(
        on_cellular.sync_now(),
        ScheduleDecision::Skipped(SkipReason::NetworkNotPermitted)
    );
}

#[tokio::test]
async fn scheduler_does_not_start_a_second_task() {
    let tmp = TempDir::new().unwrap();
    let manager = Arc::new(manager_with(&tmp, "m", SyncSettings::default()));
    manager.open_repo(StorageConfiguration::App).await.unwrap();

    let scheduler = BackgroundScheduler::new(
        Arc::clone(&manager),
        Arc::new(FixedNetwork(NetworkStatus::Other)),
    );
    assert_eq!(scheduler.sync_now(), ScheduleDecision::Spawned);
    // The spawned task has not been polled yet on this single-threaded runtime.
    assert_eq!(scheduler.sync_now(), ScheduleDecision::AlreadyRunning);
    scheduler.wait_idle().await;
    assert_eq!(scheduler.sync_now(), ScheduleDecision::Spawned);
    scheduler.wait_idle().await;
}

#[tokio::test]
async fn commit_event_survives_a_failed_sync() {
    let tmp = TempDir::new().unwrap();
    let settings = SyncSettings {
        remote: Some(RemoteConfig::default()),
        ..SyncSettings::default()
    };
    let manager = manager_with(&tmp, "m", settings);
    manager.open_repo(StorageConfiguration::App).await.unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let _sub = {
        let seen = Arc::clone(&seen);
        manager
            .events()
            .subscribe(move |event| seen.lock().unwrap().push(event))
    };

    manager.create_note("a.md", "a").await.unwrap();
    // "origin" was never added, so the sync step fails after the commit.
    let err = manager.perform_background_git_operations().await.unwrap_err();
    assert!(matches!(err, StorageError::Git(GitError::NoRemote(_))));

    let head = manager.last_commit().await.unwrap().unwrap();
    assert!(manager.uncommitted_paths().await.unwrap().is_empty());

    let events = seen.lock().unwrap().clone();
    assert!(events.contains(&StorageEvent::Committed { id: head.id }));
    assert!(events
        .iter()
        .any(|e| matches!(e, StorageEvent::SyncFinished { error: Some(_) })));
}
