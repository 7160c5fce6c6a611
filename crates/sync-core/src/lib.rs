//! sync-core: storage and synchronization engine for a Git-backed folder of
//! markdown notes.
//!
//! This crate provides:
//! - Repository lifecycle (open, init, clone, close) over libgit2
//! - Commit, fetch, merge and push with conflict detection that never
//!   rewrites the working tree on conflict
//! - A SQLite index of note metadata, rebuilt when the tree changes
//! - `StorageManager`, the async façade, and `BackgroundScheduler`

pub mod config;
pub mod conflict;
pub mod error;
pub mod events;
pub mod git_sync;
pub mod index;
pub mod note;
pub mod preferences;
pub mod repository;
pub mod scheduler;
pub mod state;
pub mod storage;

pub use config::{
    AlwaysGranted, Credentials, PermissionGate, RemoteConfig, StorageConfiguration, SyncSettings,
};
pub use conflict::{ConflictPolicy, DirtyTree, HistoryRelation, SyncPlan};
pub use error::{Cancelled, GitError, PreferencesError, StorageError, StoreError};
pub use events::{EventBus, StorageEvent, Subscription};
pub use git_sync::{CommitOutcome, GitSyncEngine, SyncOutcome};
pub use index::{IndexRecord, IndexStore, RebuildReport, SkippedFile, TreeFingerprint};
pub use note::{ContentHash, Note};
pub use preferences::{PreferenceStore, Preferences};
pub use repository::{CommitInfo, RepositoryHandle, Signature, DEFAULT_BRANCH};
pub use scheduler::{
    should_sync, BackgroundScheduler, NetworkMonitor, NetworkPolicy, NetworkStatus,
    ScheduleDecision, SkipReason,
};
pub use state::{CancelFlag, SyncGuard, SyncPhase, SyncState, SyncToken};
pub use storage::{BackgroundReport, OpenOutcome, StorageManager};
