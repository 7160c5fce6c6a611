//! Repository location and sync settings.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StorageError;
use crate::scheduler::NetworkPolicy;

/// Directory name of the repository inside the app data directory.
const APP_REPO_DIR: &str = "repo";

/// Where the repository lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum StorageConfiguration {
    /// Private app storage: `<app_data_dir>/repo`.
    App,
    /// A user-chosen directory; requires a filesystem-access grant.
    Device(PathBuf),
}

/// Grants access to user-chosen directories.
pub trait PermissionGate: Send + Sync {
    fn has_filesystem_access(&self, path: &Path) -> bool;
}

/// Gate for platforms without a permission model.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysGranted;

impl PermissionGate for AlwaysGranted {
    fn has_filesystem_access(&self, _path: &Path) -> bool {
        true
    }
}

impl StorageConfiguration {
    /// Resolve to an absolute repository root.
    ///
    /// `Device` paths are checked against the permission gate before
    /// anything else. The parent of the resolved root must exist and be
    /// writable.
    pub fn resolve(
        &self,
        app_data_dir: &Path,
        permissions: &dyn PermissionGate,
    ) -> Result<PathBuf, StorageError> {
        let root = match self {
            StorageConfiguration::App => {
                fs::create_dir_all(app_data_dir)?;
                app_data_dir.join(APP_REPO_DIR)
            }
            StorageConfiguration::Device(path) => {
                if !permissions.has_filesystem_access(path) {
                    return Err(StorageError::PermissionDenied(path.clone()));
                }
                if path.is_absolute() {
                    path.clone()
                } else {
                    std::env::current_dir()?.join(path)
                }
            }
        };

        let parent = root
            .parent()
            .ok_or_else(|| StorageError::ParentNotWritable(root.clone()))?;
        if !is_writable_dir(parent) {
            return Err(StorageError::ParentNotWritable(parent.to_path_buf()));
        }

        debug!("Resolved repository root: {}", root.display());
        Ok(root)
    }
}

/// Probe a directory by creating and removing a file in it.
fn is_writable_dir(dir: &Path) -> bool {
    if !dir.is_dir() {
        return false;
    }
    let bytes: [u8; 8] = rand::rng().random();
    let probe = dir.join(format!(".write-probe-{}", hex::encode(bytes)));
    match fs::File::create(&probe) {
        Ok(_) => {
            let _ = fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}

/// How to authenticate against the remote.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Credentials {
    /// ssh-agent, then the git credential helper, then libgit2 defaults.
    #[default]
    None,
    UserPassword {
        username: String,
        password: String,
    },
    SshKey {
        username: String,
        private_key_path: PathBuf,
        #[serde(default)]
        passphrase: Option<String>,
    },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::None => write!(f, "None"),
            Credentials::UserPassword { username, .. } => f
                .debug_struct("UserPassword")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::SshKey {
                username,
                private_key_path,
                passphrase,
            } => f
                .debug_struct("SshKey")
                .field("username", username)
                .field("private_key_path", private_key_path)
                .field("passphrase", &passphrase.as_ref().map(|_| "<redacted>"))
                .finish(),
        }
    }
}

fn default_remote_name() -> String {
    "origin".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_remote_name")]
    pub name: String,
    /// When set, the remote is created or repointed before each sync.
    #[serde(default)]
    pub url: Option<String>,
    /// Branch to sync; the checked-out branch when unset.
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub credentials: Credentials,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            name: default_remote_name(),
            url: None,
            branch: None,
            credentials: Credentials::None,
        }
    }
}

fn default_min_sync_interval_secs() -> u64 {
    300
}

fn default_note_extensions() -> Vec<String> {
    notes_fs::DEFAULT_NOTE_EXTENSIONS
        .iter()
        .map(|e| e.to_string())
        .collect()
}

fn default_commit_message() -> String {
    "Automatic commit from gitnotes".to_string()
}

/// Settings the caller hands to `StorageManager`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// `None` keeps the repository local-only.
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
    /// Minimum time between background syncs; 0 resyncs on every start.
    #[serde(default = "default_min_sync_interval_secs")]
    pub min_sync_interval_secs: u64,
    #[serde(default)]
    pub network: NetworkPolicy,
    #[serde(default = "default_note_extensions")]
    pub note_extensions: Vec<String>,
    /// Message used by background commits.
    #[serde(default = "default_commit_message")]
    pub commit_message: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            remote: None,
            min_sync_interval_secs: default_min_sync_interval_secs(),
            network: NetworkPolicy::default(),
            note_extensions: default_note_extensions(),
            commit_message: default_commit_message(),
        }
    }
}
