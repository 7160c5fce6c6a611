//! Error types for the sync engine.
//!
//! - `GitError`: repository and remote operations
//! - `StoreError`: the local index database
//! - `StorageError`: everything the `StorageManager` façade can return

use std::path::PathBuf;

use git2::{ErrorClass, ErrorCode};
use thiserror::Error;

/// Returned at a cancellation checkpoint once the caller asked to stop.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("operation cancelled")]
pub struct Cancelled;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GitError {
    /// `init` found existing Git metadata. Callers treat the path as usable.
    #[error("repository already initialized at {0}")]
    RepoAlreadyInitialized(PathBuf),

    #[error("no repository found at {0}")]
    RepoNotFound(PathBuf),

    #[error("authentication failed: {0}")]
    AuthFailure(String),

    /// The merge was aborted and the working tree left as it was.
    #[error("merge conflict in: {}", .0.join(", "))]
    MergeConflict(Vec<String>),

    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    /// The remote moved while we were pushing.
    #[error("push rejected: {0}")]
    PushRejected(String),

    #[error("remote not configured: {0}")]
    NoRemote(String),

    /// The remote has branches but none of them is the one to sync with.
    #[error("no branch of {remote} to sync {branch} with (found: {})", .candidates.join(", "))]
    UpstreamNotFound {
        remote: String,
        branch: String,
        candidates: Vec<String>,
    },

    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("repository is closed")]
    RepoClosed,

    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("git operation failed: {0}")]
    Unknown(#[from] git2::Error),
}

impl GitError {
    /// Classify an error raised while talking to a remote (fetch, push, clone).
    pub(crate) fn from_transport(err: git2::Error) -> Self {
        match (err.code(), err.class()) {
            (ErrorCode::Auth, _) | (ErrorCode::Certificate, _) => {
                GitError::AuthFailure(err.message().to_string())
            }
            (ErrorCode::User, _) => GitError::Cancelled,
            (_, ErrorClass::Net)
            | (_, ErrorClass::Http)
            | (_, ErrorClass::Ssh)
            | (_, ErrorClass::Ssl)
            | (_, ErrorClass::Os) => GitError::NetworkUnavailable(err.message().to_string()),
            _ => GitError::Unknown(err),
        }
    }

    /// Whether running the same operation again later may succeed without
    /// user intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GitError::NetworkUnavailable(_) | GitError::PushRejected(_) | GitError::Cancelled
        )
    }
}

impl From<Cancelled> for GitError {
    fn from(_: Cancelled) -> Self {
        GitError::Cancelled
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("index database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to scan working tree: {0}")]
    Walk(#[from] walkdir::Error),

    /// A single note could not be parsed into an index record.
    #[error("corrupt note {path}: {reason}")]
    Corruption { path: String, reason: String },

    #[error("index update cancelled")]
    Cancelled,
}

impl From<Cancelled> for StoreError {
    fn from(_: Cancelled) -> Self {
        StoreError::Cancelled
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PreferencesError {
    #[error("failed to access preferences: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed preferences file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Preferences(#[from] PreferencesError),

    /// The caller's expected prior version no longer matches the file.
    #[error("content changed since last read for {path}: expected {expected}, found {actual}")]
    OptimisticConflict {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("note not found: {path}")]
    NotFound { path: String },

    #[error("note already exists: {path}")]
    AlreadyExists { path: String },

    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("storage permission not granted for {0}")]
    PermissionDenied(PathBuf),

    #[error("parent directory missing or not writable: {0}")]
    ParentNotWritable(PathBuf),

    #[error("no repository is open")]
    RepoNotOpen,

    #[error("a sync is already in progress")]
    SyncInProgress,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Task(String),
}

impl StorageError {
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Git(e) => e.is_retryable(),
            StorageError::Store(StoreError::Cancelled) | StorageError::SyncInProgress => true,
            _ => false,
        }
    }
}
