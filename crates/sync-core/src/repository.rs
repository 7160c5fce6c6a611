//! An opened Git working tree.
//!
//! `RepositoryHandle` owns one `git2::Repository` and the file I/O under its
//! root. All paths taken by the handle are relative to the root and go
//! through `notes_fs::validate_relative_path` first.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{ErrorCode, FetchOptions, Repository, RepositoryInitOptions, Status, StatusOptions};
use notes_fs::validate_relative_path;
use rand::Rng;
use tracing::{debug, info};

use crate::config::Credentials;
use crate::error::GitError;
use crate::git_sync::remote_callbacks;
use crate::state::CancelFlag;

/// Branch created by `init`.
pub const DEFAULT_BRANCH: &str = "main";

/// Commit identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub timestamp: DateTime<Utc>,
}

impl Signature {
    pub fn now(name: String, email: String) -> Self {
        Self {
            name,
            email,
            timestamp: Utc::now(),
        }
    }

    pub(crate) fn to_git(&self) -> Result<git2::Signature<'static>, git2::Error> {
        let time = git2::Time::new(self.timestamp.timestamp(), 0);
        git2::Signature::new(&self.name, &self.email, &time)
    }
}

/// Summary of a commit for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub id: String,
    pub summary: String,
    pub author: String,
    pub time: DateTime<Utc>,
}

impl CommitInfo {
    fn from_commit(commit: &git2::Commit<'_>) -> Self {
        Self {
            id: commit.id().to_string(),
            summary: commit.summary().unwrap_or_default().to_string(),
            author: commit.author().name().unwrap_or_default().to_string(),
            time: DateTime::from_timestamp(commit.time().seconds(), 0).unwrap_or_default(),
        }
    }
}

pub struct RepositoryHandle {
    root: PathBuf,
    repo: Option<Repository>,
}

impl std::fmt::Debug for RepositoryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryHandle")
            .field("root", &self.root)
            .field("open", &self.repo.is_some())
            .finish()
    }
}

impl RepositoryHandle {
    /// Open an existing working tree at `path`.
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let repo = match Repository::open(path) {
            Ok(repo) => repo,
            Err(e) if e.code() == ErrorCode::NotFound => {
                return Err(GitError::RepoNotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };

        if repo.workdir().is_none() {
            return Err(GitError::RepoNotFound(path.to_path_buf()));
        }

        debug!("Opened repository at {}", path.display());
        Ok(Self {
            root: path.to_path_buf(),
            repo: Some(repo),
        })
    }

    /// Create a new repository at `path`, creating the directory if needed.
    pub fn init(path: &Path) -> Result<Self, GitError> {
        if path.join(".git").exists() {
            return Err(GitError::RepoAlreadyInitialized(path.to_path_buf()));
        }

        fs::create_dir_all(path)?;
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head(DEFAULT_BRANCH);
        let repo = Repository::init_opts(path, &opts)?;

        info!("Initialized repository at {}", path.display());
        Ok(Self {
            root: path.to_path_buf(),
            repo: Some(repo),
        })
    }

    /// Clone `url` into `path`, which must not hold a repository yet.
    pub fn clone_from(
        url: &str,
        path: &Path,
        credentials: &Credentials,
        cancel: &CancelFlag,
    ) -> Result<Self, GitError> {
        if path.join(".git").exists() {
            return Err(GitError::RepoAlreadyInitialized(path.to_path_buf()));
        }
        cancel.ensure_not_cancelled()?;

        let mut fetch = FetchOptions::new();
        let config = git2::Config::open_default().ok();
        fetch.remote_callbacks(remote_callbacks(credentials, config, cancel));

        let result = RepoBuilder::new().fetch_options(fetch).clone(url, path);
        let repo = match result {
            Ok(repo) => repo,
            Err(_) if cancel.is_cancelled() => return Err(GitError::Cancelled),
            Err(e) => return Err(GitError::from_transport(e)),
        };

        info!("Cloned {} into {}", url, path.display());
        Ok(Self {
            root: path.to_path_buf(),
            repo: Some(repo),
        })
    }

    /// Release the repository. Safe to call more than once.
    pub fn close(&mut self) {
        if self.repo.take().is_some() {
            debug!("Closed repository at {}", self.root.display());
        }
    }

    pub fn is_open(&self) -> bool {
        self.repo.is_some()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn repo(&self) -> Result<&Repository, GitError> {
        self.repo.as_ref().ok_or(GitError::RepoClosed)
    }

    /// Identity from the repository's (or the user's global) git config.
    pub fn current_signature(&self) -> Option<Signature> {
        let sig = self.repo.as_ref()?.signature().ok()?;
        Some(Signature::now(
            sig.name()?.to_string(),
            sig.email()?.to_string(),
        ))
    }

    /// Name of the checked-out branch, also when it has no commits yet.
    pub fn current_branch(&self) -> Result<String, GitError> {
        let repo = self.repo()?;
        let head = repo.find_reference("HEAD")?;
        let target = head
            .symbolic_target()
            .ok_or_else(|| git2::Error::from_str("HEAD is detached"))?;
        Ok(target.strip_prefix("refs/heads/").unwrap_or(target).to_string())
    }

    /// Paths with staged, unstaged or untracked (non-ignored) changes.
    pub fn changed_paths(&self) -> Result<Vec<String>, GitError> {
        let repo = self.repo()?;
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false)
            .renames_head_to_index(false);

        let statuses = repo.statuses(Some(&mut opts))?;
        let mut paths: Vec<String> = statuses
            .iter()
            .filter(|entry| {
                let status = entry.status();
                status != Status::CURRENT && !status.contains(Status::IGNORED)
            })
            .filter_map(|entry| entry.path().map(str::to_string))
            .collect();
        paths.sort();
        paths.dedup();
        Ok(paths)
    }

    pub fn has_changes(&self) -> Result<bool, GitError> {
        Ok(!self.changed_paths()?.is_empty())
    }

    /// Throw away uncommitted changes under `relative_path`, untracked files
    /// included. Everything outside the path is left alone.
    pub fn checkout_path(&self, relative_path: &str) -> Result<(), GitError> {
        let rel = validate_path(relative_path)?;
        let repo = self.repo()?;

        let head = match repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(e) if is_unborn(&e) => None,
            Err(e) => return Err(e.into()),
        };

        match head {
            Some(commit) => {
                repo.reset_default(Some(commit.as_object()), [rel.as_str()])?;
                let mut checkout = CheckoutBuilder::new();
                checkout.force().remove_untracked(true).path(rel.as_str());
                repo.checkout_head(Some(&mut checkout))?;
            }
            None => {
                // Nothing committed yet: everything under the path is new.
                let mut index = repo.index()?;
                index.remove_all([rel.as_str()], None)?;
                index.write()?;
                let full = self.root.join(&rel);
                if full.is_dir() {
                    fs::remove_dir_all(&full)?;
                } else if full.exists() {
                    fs::remove_file(&full)?;
                }
            }
        }

        info!("Discarded changes under {}", rel);
        Ok(())
    }

    /// Absolute path of a validated relative path.
    pub fn full_path(&self, relative_path: &str) -> Result<PathBuf, GitError> {
        Ok(self.root.join(validate_path(relative_path)?))
    }

    /// File contents, or `None` if the file does not exist.
    pub fn read_file(&self, relative_path: &str) -> Result<Option<Vec<u8>>, GitError> {
        let path = self.full_path(relative_path)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write a file through a temp file and rename, creating parent folders.
    pub fn write_file(&self, relative_path: &str, contents: &[u8]) -> Result<(), GitError> {
        self.repo()?;
        let path = self.full_path(relative_path)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        atomic_write(&path, contents)?;
        Ok(())
    }

    /// Remove a file. Returns whether it existed.
    pub fn remove_file(&self, relative_path: &str) -> Result<bool, GitError> {
        self.repo()?;
        let path = self.full_path(relative_path)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Bring the index entry for a path in line with the working tree.
    pub fn stage_path(&self, relative_path: &str) -> Result<(), GitError> {
        let rel = validate_path(relative_path)?;
        let repo = self.repo()?;
        let mut index = repo.index()?;
        if self.root.join(&rel).is_file() {
            index.add_path(Path::new(&rel))?;
        } else {
            index.remove_path(Path::new(&rel))?;
        }
        index.write()?;
        Ok(())
    }

    /// The commit HEAD points to; `None` before the first commit.
    pub fn head_commit(&self) -> Result<Option<CommitInfo>, GitError> {
        let repo = self.repo()?;
        let head = match repo.head() {
            Ok(head) => head,
            Err(e) if is_unborn(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let commit = head.peel_to_commit()?;
        Ok(Some(CommitInfo::from_commit(&commit)))
    }

    /// Add the remote, or repoint it if the URL changed.
    pub fn set_remote(&self, name: &str, url: &str) -> Result<(), GitError> {
        let repo = self.repo()?;
        match repo.find_remote(name) {
            Ok(remote) => {
                if remote.url() != Some(url) {
                    repo.remote_set_url(name, url)?;
                    info!("Remote {} now points to {}", name, url);
                }
            }
            Err(e) if e.code() == ErrorCode::NotFound => {
                repo.remote(name, url)?;
                info!("Added remote {} -> {}", name, url);
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}

pub(crate) fn is_unborn(err: &git2::Error) -> bool {
    matches!(err.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound)
}

fn validate_path(path: &str) -> Result<String, GitError> {
    validate_relative_path(path).map_err(|e| GitError::InvalidPath {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

fn random_hex() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    hex::encode(bytes)
}

/// Either the whole new content lands at `path` or the file is untouched.
fn atomic_write(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let temp_path = path.with_extension(format!("{}.tmp", random_hex()));

    if let Err(e) = fs::write(&temp_path, contents) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    Ok(())
}
