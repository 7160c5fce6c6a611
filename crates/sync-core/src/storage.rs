//! `StorageManager`: the façade callers use for notes, commits, sync and the
//! index.
//!
//! The open repository and its index sit behind one async mutex. Every
//! operation takes the owned guard into `spawn_blocking`, so git2 and SQLite
//! work never runs on the async executor and never overlaps on one
//! repository. Commit, sync and background cycles additionally hold the
//! single-flight `SyncToken`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Utc};
use notes_fs::validate_relative_path;
use sha2::{Digest, Sha256};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::config::{AlwaysGranted, PermissionGate, StorageConfiguration, SyncSettings};
use crate::conflict::ConflictPolicy;
use crate::error::{GitError, StorageError, StoreError};
use crate::events::{EventBus, StorageEvent};
use crate::git_sync::{CommitOutcome, GitSyncEngine, SyncOutcome};
use crate::index::{IndexRecord, IndexStore, RebuildReport, SkippedFile};
use crate::note::{ContentHash, Note};
use crate::preferences::PreferenceStore;
use crate::repository::{CommitInfo, RepositoryHandle, Signature};
use crate::state::{SyncGuard, SyncState, SyncToken};

/// How `open_repo` / `clone_repo` obtained the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    Opened,
    Initialized,
    Cloned,
}

/// Result of one background cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundReport {
    /// `None` when the tree had nothing to commit.
    pub commit: Option<CommitOutcome>,
    pub sync: SyncOutcome,
    pub index: RebuildReport,
}

struct OpenRepo {
    handle: RepositoryHandle,
    index: IndexStore,
}

pub struct StorageManager {
    app_data_dir: PathBuf,
    state_dir: PathBuf,
    settings: SyncSettings,
    policy: ConflictPolicy,
    permissions: Arc<dyn PermissionGate>,
    inner: Arc<Mutex<Option<OpenRepo>>>,
    token: SyncToken,
    prefs: Arc<StdMutex<PreferenceStore>>,
    events: Arc<EventBus>,
}

impl StorageManager {
    /// `app_data_dir` hosts the `App` repository; `state_dir` holds the
    /// index databases and `preferences.json`.
    pub fn new(app_data_dir: PathBuf, state_dir: PathBuf, settings: SyncSettings) -> Self {
        let prefs = PreferenceStore::new(&state_dir);
        Self {
            app_data_dir,
            state_dir,
            settings,
            policy: ConflictPolicy::default(),
            permissions: Arc::new(AlwaysGranted),
            inner: Arc::new(Mutex::new(None)),
            token: SyncToken::new(),
            prefs: Arc::new(StdMutex::new(prefs)),
            events: Arc::new(EventBus::new()),
        }
    }

    pub fn with_permission_gate(mut self, gate: Arc<dyn PermissionGate>) -> Self {
        self.permissions = gate;
        self
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    pub fn sync_state(&self) -> SyncState {
        self.token.state()
    }

    pub fn subscribe_sync_state(&self) -> watch::Receiver<SyncState> {
        self.token.subscribe()
    }

    pub fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        lock_prefs(&self.prefs).last_sync_at()
    }

    /// Root of the open repository, if any.
    pub async fn current_root(&self) -> Option<PathBuf> {
        self.inner
            .lock()
            .await
            .as_ref()
            .map(|open| open.handle.root().to_path_buf())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Open the configured repository, initializing it if none exists. Any
    /// previously open repository is closed first.
    pub async fn open_repo(
        &self,
        config: StorageConfiguration,
    ) -> Result<OpenOutcome, StorageError> {
        let root = config.resolve(&self.app_data_dir, self.permissions.as_ref())?;
        self.close_repo().await;

        let index_path = index_path_for(&self.state_dir, &root);
        let extensions = self.settings.note_extensions.clone();
        let mut slot = Arc::clone(&self.inner).lock_owned().await;

        let outcome = run_blocking(move || {
            let (handle, outcome) = match RepositoryHandle::open(&root) {
                Ok(handle) => (handle, OpenOutcome::Opened),
                Err(GitError::RepoNotFound(_)) => match RepositoryHandle::init(&root) {
                    Ok(handle) => (handle, OpenOutcome::Initialized),
                    Err(GitError::RepoAlreadyInitialized(_)) => {
                        (RepositoryHandle::open(&root)?, OpenOutcome::Opened)
                    }
                    Err(e) => return Err(e.into()),
                },
                Err(e) => return Err(e.into()),
            };
            let index = IndexStore::open(&index_path, extensions)?;
            *slot = Some(OpenRepo { handle, index });
            Ok(outcome)
        })
        .await?;

        let root = self.current_root().await.unwrap_or_default();
        info!("Repository ready at {} ({:?})", root.display(), outcome);
        self.events.emit(StorageEvent::RepoOpened {
            root: root.display().to_string(),
        });
        Ok(outcome)
    }

    /// Clone `url` into the configured location, then build the index.
    pub async fn clone_repo(
        &self,
        config: StorageConfiguration,
        url: &str,
    ) -> Result<OpenOutcome, StorageError> {
        let root = config.resolve(&self.app_data_dir, self.permissions.as_ref())?;
        self.close_repo().await;

        let index_path = index_path_for(&self.state_dir, &root);
        let extensions = self.settings.note_extensions.clone();
        let credentials = self
            .settings
            .remote
            .as_ref()
            .map(|r| r.credentials.clone())
            .unwrap_or_default();
        let url = url.to_string();
        let cancel = self.token.cancel_flag();
        let mut slot = Arc::clone(&self.inner).lock_owned().await;

        let report = run_blocking(move || {
            let handle = RepositoryHandle::clone_from(&url, &root, &credentials, &cancel)?;
            let mut index = IndexStore::open(&index_path, extensions)?;
            let report = index.rebuild(handle.root(), &cancel)?;
            *slot = Some(OpenRepo { handle, index });
            Ok(report)
        })
        .await?;

        self.record_sync()?;
        self.emit_rebuilt(&report);
        if let Some(root) = self.current_root().await {
            self.events.emit(StorageEvent::RepoOpened {
                root: root.display().to_string(),
            });
        }
        Ok(OpenOutcome::Cloned)
    }

    /// Cancel in-flight work, wait for it to stop, then release the
    /// repository. No-op when nothing is open.
    pub async fn close_repo(&self) {
        self.token.cancel();
        self.token.drain().await;

        let closed = {
            let mut slot = self.inner.lock().await;
            match slot.take() {
                Some(mut open) => {
                    open.handle.close();
                    true
                }
                None => false,
            }
        };
        self.token.reset_cancel();

        if closed {
            info!("Repository closed");
            self.events.emit(StorageEvent::RepoClosed);
        }
    }

    /// Ask a running sync or rebuild to stop at its next checkpoint. Stays
    /// in force until `clear_cancel` or the next sync starts.
    pub fn cancel_current(&self) {
        self.token.cancel();
    }

    pub fn clear_cancel(&self) {
        self.token.reset_cancel();
    }

    /// Wait until no sync is running.
    pub async fn wait_idle(&self) {
        self.token.drain().await;
    }

    // ------------------------------------------------------------------
    // Notes
    // ------------------------------------------------------------------

    pub async fn read_note(&self, path: &str) -> Result<Note, StorageError> {
        let rel = validate_path(path)?;
        self.with_repo(move |open| {
            load_note(&open.handle, &rel)?.ok_or(StorageError::NotFound { path: rel })
        })
        .await
    }

    /// Write a new note and stage it. Fails if the path is taken.
    pub async fn create_note(&self, path: &str, content: &str) -> Result<Note, StorageError> {
        let rel = validate_path(path)?;
        let content = content.to_string();

        let note = self
            .with_repo(move |open| {
                if open.handle.read_file(&rel)?.is_some() {
                    return Err(StorageError::AlreadyExists { path: rel });
                }
                open.handle.write_file(&rel, content.as_bytes())?;
                open.handle.stage_path(&rel)?;
                open.index.upsert_path(open.handle.root(), &rel)?;
                load_note(&open.handle, &rel)?.ok_or(StorageError::NotFound { path: rel })
            })
            .await?;

        debug!("Created note {}", note.path);
        self.events.emit(StorageEvent::NoteCreated {
            path: note.path.clone(),
        });
        Ok(note)
    }

    /// Replace `expected_old` with `new`, possibly under a new path.
    ///
    /// The write is refused with `OptimisticConflict` if the file no longer
    /// holds `expected_old.content`; the file is not touched in that case.
    pub async fn update_note(&self, new: &Note, expected_old: &Note) -> Result<Note, StorageError> {
        let old_rel = validate_path(&expected_old.path)?;
        let new_rel = validate_path(&new.path)?;
        let expected = expected_old.content_hash();
        let content = new.content.clone();

        let (note, previous) = self
            .with_repo(move |open| {
                let current = open
                    .handle
                    .read_file(&old_rel)?
                    .ok_or_else(|| StorageError::NotFound {
                        path: old_rel.clone(),
                    })?;
                let actual = ContentHash::from_bytes(&current);
                if actual != expected {
                    return Err(StorageError::OptimisticConflict {
                        path: old_rel,
                        expected: expected.to_string(),
                        actual: actual.to_string(),
                    });
                }

                let renamed = new_rel != old_rel;
                if renamed && open.handle.read_file(&new_rel)?.is_some() {
                    return Err(StorageError::AlreadyExists { path: new_rel });
                }

                open.handle.write_file(&new_rel, content.as_bytes())?;
                open.handle.stage_path(&new_rel)?;
                let root = open.handle.root().to_path_buf();
                if renamed {
                    open.handle.remove_file(&old_rel)?;
                    open.handle.stage_path(&old_rel)?;
                    open.index.remove_path(&old_rel)?;
                }
                open.index.upsert_path(&root, &new_rel)?;

                let note = load_note(&open.handle, &new_rel)?
                    .ok_or_else(|| StorageError::NotFound { path: new_rel.clone() })?;
                Ok((note, renamed.then_some(old_rel)))
            })
            .await?;

        debug!("Updated note {}", note.path);
        self.events.emit(StorageEvent::NoteUpdated {
            path: note.path.clone(),
            previous_path: previous,
        });
        Ok(note)
    }

    /// Remove a note's file, stage the deletion and drop its index row.
    pub async fn delete_note(&self, path: &str) -> Result<(), StorageError> {
        let rel = validate_path(path)?;
        {
            let rel = rel.clone();
            self.with_repo(move |open| {
                if !open.handle.remove_file(&rel)? {
                    return Err(StorageError::NotFound { path: rel });
                }
                open.handle.stage_path(&rel)?;
                open.index.remove_path(&rel)?;
                Ok(())
            })
            .await?;
        }

        debug!("Deleted note {}", rel);
        self.events.emit(StorageEvent::NoteDeleted { path: rel });
        Ok(())
    }

    /// Throw away uncommitted changes under `path` and refresh its index rows.
    pub async fn discard_changes(&self, path: &str) -> Result<(), StorageError> {
        let rel = validate_path(path)?;
        self.with_repo(move |open| {
            open.handle.checkout_path(&rel)?;
            let root = open.handle.root().to_path_buf();
            open.index.refresh_prefix(&root, &rel)?;
            Ok(())
        })
        .await
    }

    // ------------------------------------------------------------------
    // Index
    // ------------------------------------------------------------------

    /// `force == false` rebuilds only when the tree changed since the last
    /// rebuild; `force == true` always rebuilds. Returns whether a rebuild
    /// ran. Persists the sync watermark on success.
    pub async fn update_database(&self, force: bool) -> Result<bool, StorageError> {
        let cancel = self.token.cancel_flag();
        let (rebuilt, notes, skipped) = self
            .with_repo(move |open| {
                let root = open.handle.root().to_path_buf();
                let rebuilt = if force {
                    open.index.rebuild(&root, &cancel)?;
                    true
                } else {
                    open.index.update_if_needed(&root, &cancel)?
                };
                Ok((rebuilt, open.index.count()?, open.index.skipped()?.len()))
            })
            .await?;

        self.record_sync()?;
        if rebuilt {
            self.events.emit(StorageEvent::IndexRebuilt { notes, skipped });
        }
        Ok(rebuilt)
    }

    pub async fn list_notes(&self, folder: &str) -> Result<Vec<IndexRecord>, StorageError> {
        let folder = folder.to_string();
        self.with_repo(move |open| Ok(open.index.list_folder(&folder)?))
            .await
    }

    pub async fn search_notes(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<IndexRecord>, StorageError> {
        let query = query.to_string();
        self.with_repo(move |open| Ok(open.index.search(&query, limit)?))
            .await
    }

    pub async fn indexed_paths(&self) -> Result<Vec<String>, StorageError> {
        self.with_repo(|open| Ok(open.index.all_paths()?)).await
    }

    pub async fn skipped_notes(&self) -> Result<Vec<SkippedFile>, StorageError> {
        self.with_repo(|open| Ok(open.index.skipped()?)).await
    }

    /// Bring one index row in line with the file on disk, for edits made
    /// outside the manager. A missing file drops the row.
    pub async fn refresh_path(&self, path: &str) -> Result<bool, StorageError> {
        let rel = validate_path(path)?;
        self.with_repo(move |open| {
            let root = open.handle.root().to_path_buf();
            Ok(open.index.upsert_path(&root, &rel)?)
        })
        .await
    }

    // ------------------------------------------------------------------
    // Git
    // ------------------------------------------------------------------

    pub async fn last_commit(&self) -> Result<Option<CommitInfo>, StorageError> {
        self.with_repo(|open| Ok(open.handle.head_commit()?)).await
    }

    /// Paths with uncommitted changes.
    pub async fn uncommitted_paths(&self) -> Result<Vec<String>, StorageError> {
        self.with_repo(|open| Ok(open.handle.changed_paths()?)).await
    }

    pub async fn commit_all(&self, message: &str) -> Result<CommitOutcome, StorageError> {
        let guard = self.acquire()?;
        let message = message.to_string();
        let prefs = Arc::clone(&self.prefs);
        let policy = self.policy;

        let outcome = self
            .with_repo(move |open| {
                let cancel = guard.cancel_flag();
                let signature = resolve_signature(&prefs, &open.handle)?;
                let outcome = GitSyncEngine::new(&open.handle)
                    .with_policy(policy)
                    .commit_all(&signature, &message, &cancel)?;
                drop(guard);
                Ok(outcome)
            })
            .await?;

        if let CommitOutcome::Committed { id } = &outcome {
            self.events.emit(StorageEvent::Committed { id: id.clone() });
        }
        Ok(outcome)
    }

    /// Pull, merge and push against the configured remote. Does not commit
    /// local changes. Pulled changes are folded into the index.
    pub async fn sync(&self) -> Result<SyncOutcome, StorageError> {
        let mut guard = self.acquire()?;
        let remote = self.settings.remote.clone();
        let prefs = Arc::clone(&self.prefs);
        let policy = self.policy;

        self.events.emit(StorageEvent::SyncStarted);
        let result = self
            .with_repo(move |open| {
                let cancel = guard.cancel_flag();
                let signature = resolve_signature(&prefs, &open.handle)?;
                let outcome = GitSyncEngine::new(&open.handle)
                    .with_policy(policy)
                    .sync(remote.as_ref(), &signature, &cancel)?;
                if matches!(
                    outcome,
                    SyncOutcome::FastForwarded { .. } | SyncOutcome::Merged { .. }
                ) {
                    let root = open.handle.root().to_path_buf();
                    open.index.update_if_needed(&root, &cancel)?;
                }
                guard.mark_succeeded();
                Ok(outcome)
            })
            .await;

        self.emit_finished(&result);
        result
    }

    /// Background cycle: commit (if there are changes), sync, then rebuild
    /// the index unconditionally. Stops at the first failure without
    /// undoing earlier steps.
    pub async fn perform_background_git_operations(
        &self,
    ) -> Result<BackgroundReport, StorageError> {
        let mut guard = self.acquire()?;
        let remote = self.settings.remote.clone();
        let message = self.settings.commit_message.clone();
        let prefs = Arc::clone(&self.prefs);
        let policy = self.policy;
        let events = Arc::clone(&self.events);

        self.events.emit(StorageEvent::SyncStarted);
        let result = self
            .with_repo(move |open| {
                let cancel = guard.cancel_flag();
                let signature = resolve_signature(&prefs, &open.handle)?;
                let engine = GitSyncEngine::new(&open.handle).with_policy(policy);

                let commit = if open.handle.has_changes()? {
                    let outcome = engine.commit_all(&signature, &message, &cancel)?;
                    // The commit stands even when the sync below fails.
                    if let CommitOutcome::Committed { id } = &outcome {
                        events.emit(StorageEvent::Committed { id: id.clone() });
                    }
                    Some(outcome)
                } else {
                    None
                };
                let sync = engine.sync(remote.as_ref(), &signature, &cancel)?;

                let root = open.handle.root().to_path_buf();
                let index = open.index.rebuild(&root, &cancel)?;
                guard.mark_succeeded();
                Ok(BackgroundReport { commit, sync, index })
            })
            .await;

        if let Ok(report) = &result {
            self.record_sync()?;
            self.emit_rebuilt(&report.index);
            info!("Background cycle finished: {:?}", report.sync);
        }
        self.emit_finished(&result);
        result
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn acquire(&self) -> Result<SyncGuard, StorageError> {
        self.token.try_acquire().ok_or(StorageError::SyncInProgress)
    }

    /// Run `f` against the open repository on the blocking pool, holding
    /// the repository lock for its whole duration.
    async fn with_repo<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut OpenRepo) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let mut slot = Arc::clone(&self.inner).lock_owned().await;
        run_blocking(move || {
            let open = slot.as_mut().ok_or(StorageError::RepoNotOpen)?;
            f(open)
        })
        .await
    }

    fn record_sync(&self) -> Result<(), StorageError> {
        lock_prefs(&self.prefs).record_sync(Utc::now())?;
        Ok(())
    }

    fn emit_rebuilt(&self, report: &RebuildReport) {
        self.events.emit(StorageEvent::IndexRebuilt {
            notes: report.indexed,
            skipped: report.skipped.len(),
        });
    }

    fn emit_finished<T>(&self, result: &Result<T, StorageError>) {
        let error = match result {
            Ok(_) => None,
            Err(e) => {
                warn!("Sync failed: {}", e);
                Some(e.to_string())
            }
        };
        self.events.emit(StorageEvent::SyncFinished { error });
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, StorageError>
where
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
}

fn lock_prefs(prefs: &StdMutex<PreferenceStore>) -> std::sync::MutexGuard<'_, PreferenceStore> {
    prefs.lock().unwrap_or_else(|e| e.into_inner())
}

fn resolve_signature(
    prefs: &StdMutex<PreferenceStore>,
    handle: &RepositoryHandle,
) -> Result<Signature, StorageError> {
    Ok(lock_prefs(prefs).resolve_author(handle.current_signature())?)
}

fn validate_path(path: &str) -> Result<String, StorageError> {
    validate_relative_path(path).map_err(|e| StorageError::InvalidPath {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

/// `<state_dir>/index-<hash of root>.sqlite`, one index per repository root.
fn index_path_for(state_dir: &Path, root: &Path) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(root.to_string_lossy().as_bytes());
    let digest = hex::encode(hasher.finalize());
    state_dir.join(format!("index-{}.sqlite", &digest[..16]))
}

fn load_note(handle: &RepositoryHandle, rel: &str) -> Result<Option<Note>, StorageError> {
    let bytes = match handle.read_file(rel)? {
        Some(bytes) => bytes,
        None => return Ok(None),
    };
    let content = String::from_utf8(bytes).map_err(|e| StoreError::Corruption {
        path: rel.to_string(),
        reason: format!("not valid UTF-8: {}", e.utf8_error()),
    })?;
    let last_modified_millis = fs::metadata(handle.full_path(rel)?)
        .ok()
        .and_then(|m| m.modified().ok())
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);

    Ok(Some(Note {
        path: rel.to_string(),
        content,
        last_modified_millis,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CancelFlag;
    use tempfile::TempDir;

    fn manager(tmp: &TempDir) -> StorageManager {
        StorageManager::new(
            tmp.path().join("app"),
            tmp.path().join("state"),
            SyncSettings::default(),
        )
    }

    #[test]
    fn index_path_depends_on_root() {
        let state = Path::new("/state");
        let a = index_path_for(state, Path::new("/notes/a"));
        let b = index_path_for(state, Path::new("/notes/b"));
        assert_ne!(a, b);
        assert_eq!(a, index_path_for(state, Path::new("/notes/a")));
        assert!(a.file_name().unwrap().to_str().unwrap().starts_with("index-"));
    }

    #[tokio::test]
    async fn operations_require_open_repo() {
        let tmp = TempDir::new().unwrap();
        let manager = manager(&tmp);
        assert!(matches!(
            manager.read_note("a.md").await,
            Err(StorageError::RepoNotOpen)
        ));
        assert!(matches!(
            manager.update_database(false).await,
            Err(StorageError::RepoNotOpen)
        ));
        // Closing with nothing open is fine.
        manager.close_repo().await;
    }

    #[tokio::test]
    async fn open_initializes_then_reopens() {
        let tmp = TempDir::new().unwrap();
        let manager = manager(&tmp);
        assert_eq!(
            manager.open_repo(StorageConfiguration::App).await.unwrap(),
            OpenOutcome::Initialized
        );
        assert_eq!(
            manager.open_repo(StorageConfiguration::App).await.unwrap(),
            OpenOutcome::Opened
        );
        assert_eq!(
            manager.current_root().await,
            Some(tmp.path().join("app").join("repo"))
        );
    }

    #[tokio::test]
    async fn invalid_paths_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let manager = manager(&tmp);
        manager.open_repo(StorageConfiguration::App).await.unwrap();
        assert!(matches!(
            manager.create_note("../outside.md", "x").await,
            Err(StorageError::InvalidPath { .. })
        ));
    }

    #[tokio::test]
    async fn second_sync_is_rejected_while_running() {
        let tmp = TempDir::new().unwrap();
        let manager = manager(&tmp);
        manager.open_repo(StorageConfiguration::App).await.unwrap();

        let _held = manager.acquire().unwrap();
        assert!(matches!(manager.sync().await, Err(StorageError::SyncInProgress)));
        assert!(matches!(
            manager.perform_background_git_operations().await,
            Err(StorageError::SyncInProgress)
        ));
    }

    #[tokio::test]
    async fn sync_without_remote_is_local_only() {
        let tmp = TempDir::new().unwrap();
        let manager = manager(&tmp);
        manager.open_repo(StorageConfiguration::App).await.unwrap();
        assert_eq!(manager.sync().await.unwrap(), SyncOutcome::LocalOnly);
        assert!(manager.sync_state().last_completed_at.is_some());
    }

    #[tokio::test]
    async fn cancel_flag_is_shared_with_token() {
        let tmp = TempDir::new().unwrap();
        let manager = manager(&tmp);
        let flag: CancelFlag = manager.token.cancel_flag();
        manager.cancel_current();
        assert!(flag.is_cancelled());
        manager.close_repo().await;
        assert!(!flag.is_cancelled());
    }
}
