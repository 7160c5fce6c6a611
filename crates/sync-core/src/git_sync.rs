//! Commit, pull/merge and push for one open repository.
//!
//! `sync` runs fetch → decide → apply → push. The decision comes from
//! `ConflictPolicy` and is taken before the working tree is touched, so an
//! aborted sync leaves every file exactly as it was. Merges are computed in
//! memory with `merge_trees`; a conflicted result is never written out.

use std::cell::RefCell;

use git2::build::CheckoutBuilder;
use git2::{
    BranchType, CheckoutNotificationType, Cred, ErrorClass, ErrorCode, FetchOptions, FetchPrune,
    IndexAddOption, Oid, PushOptions, RemoteCallbacks, Repository, Tree,
};
use tracing::{debug, info, warn};

use crate::config::{Credentials, RemoteConfig};
use crate::conflict::{ConflictPolicy, HistoryRelation, SyncPlan};
use crate::error::GitError;
use crate::repository::{is_unborn, RepositoryHandle, Signature};
use crate::state::CancelFlag;

/// Credential callbacks give up after this many tries per operation.
const MAX_CREDENTIAL_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    NothingToCommit,
    Committed { id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No remote configured; nothing went over the network.
    LocalOnly,
    UpToDate,
    FastForwarded { head: String },
    /// Remote history merged in and the merge commit pushed.
    Merged { head: String },
    Pushed { head: String },
}

pub struct GitSyncEngine<'a> {
    handle: &'a RepositoryHandle,
    policy: ConflictPolicy,
}

impl<'a> GitSyncEngine<'a> {
    pub fn new(handle: &'a RepositoryHandle) -> Self {
        Self {
            handle,
            policy: ConflictPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Stage every added, modified and deleted path and commit them as one
    /// commit on the current branch.
    ///
    /// The on-disk git index is only written once the commit exists, so a
    /// failed or cancelled commit leaves nothing staged behind.
    pub fn commit_all(
        &self,
        signature: &Signature,
        message: &str,
        cancel: &CancelFlag,
    ) -> Result<CommitOutcome, GitError> {
        if !self.handle.has_changes()? {
            return Ok(CommitOutcome::NothingToCommit);
        }
        cancel.ensure_not_cancelled()?;

        let repo = self.handle.repo()?;
        let mut index = repo.index()?;
        let result = (|| -> Result<Option<Oid>, GitError> {
            index.add_all(["*"], IndexAddOption::DEFAULT, None)?;
            index.update_all(["*"], None)?;
            let tree_id = index.write_tree()?;
            cancel.ensure_not_cancelled()?;

            let parent = head_commit(repo)?;
            if let Some(parent) = &parent {
                if parent.tree_id() == tree_id {
                    return Ok(None);
                }
            }

            let tree = repo.find_tree(tree_id)?;
            let sig = signature.to_git()?;
            let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
            let id = repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;
            index.write()?;
            Ok(Some(id))
        })();

        match result {
            Ok(Some(id)) => {
                info!("Committed {} ({})", id, message);
                Ok(CommitOutcome::Committed { id: id.to_string() })
            }
            Ok(None) => {
                index.read(true)?;
                Ok(CommitOutcome::NothingToCommit)
            }
            Err(e) => {
                // Drop the in-memory staging so the next status sees disk state.
                if let Err(reload) = index.read(true) {
                    warn!("Failed to reload git index after aborted commit: {}", reload);
                }
                Err(e)
            }
        }
    }

    /// Pull, merge and push against `remote`. `None` means the repository is
    /// local-only.
    pub fn sync(
        &self,
        remote: Option<&RemoteConfig>,
        signature: &Signature,
        cancel: &CancelFlag,
    ) -> Result<SyncOutcome, GitError> {
        let remote = match remote {
            Some(remote) => remote,
            None => return Ok(SyncOutcome::LocalOnly),
        };
        cancel.ensure_not_cancelled()?;

        let repo = self.handle.repo()?;
        if let Some(url) = &remote.url {
            self.handle.set_remote(&remote.name, url)?;
        } else if repo.find_remote(&remote.name).is_err() {
            return Err(GitError::NoRemote(remote.name.clone()));
        }

        let branch = match &remote.branch {
            Some(branch) => branch.clone(),
            None => self.handle.current_branch()?,
        };

        let advertised = self.fetch(repo, remote, cancel)?;
        cancel.ensure_not_cancelled()?;

        let upstream = match &remote.branch {
            Some(branch) => branch.clone(),
            None => resolve_upstream(repo, &remote.name, &branch, advertised.as_deref())?,
        };

        let local_ref = format!("refs/heads/{}", branch);
        let remote_ref = format!("refs/remotes/{}/{}", remote.name, upstream);
        let local = repo.refname_to_id(&local_ref).ok();
        let theirs = repo.refname_to_id(&remote_ref).ok();

        let relation = match relation_between(repo, local, theirs)? {
            Some(relation) => relation,
            None => return Ok(SyncOutcome::UpToDate),
        };

        let incoming = match theirs {
            Some(r) => incoming_paths(repo, local, r)?,
            None => Vec::new(),
        };
        let dirty = self.handle.changed_paths()?;
        let plan = self.policy.decide(relation, &dirty, &incoming);
        debug!(?relation, ?plan, "Sync plan for {} against {}/{}", branch, remote.name, upstream);

        cancel.ensure_not_cancelled()?;
        match plan {
            SyncPlan::UpToDate => Ok(SyncOutcome::UpToDate),
            SyncPlan::Abort { paths } => {
                warn!("Sync aborted, local changes overlap remote: {:?}", paths);
                Err(GitError::MergeConflict(paths))
            }
            SyncPlan::FastForward => {
                let target = theirs.ok_or_else(|| git2::Error::from_str("missing remote tip"))?;
                self.fast_forward(repo, &local_ref, target)?;
                info!("Fast-forwarded {} to {}", branch, target);
                Ok(SyncOutcome::FastForwarded {
                    head: target.to_string(),
                })
            }
            SyncPlan::PushOnly => {
                self.push(repo, remote, &branch, &upstream, cancel)?;
                let head = local.map(|oid| oid.to_string()).unwrap_or_default();
                Ok(SyncOutcome::Pushed { head })
            }
            SyncPlan::Merge => {
                let (ours, theirs) = match (local, theirs) {
                    (Some(l), Some(r)) => (l, r),
                    _ => return Err(git2::Error::from_str("merge without both tips").into()),
                };
                let merged = self.merge(repo, remote, &branch, &upstream, ours, theirs, signature)?;
                cancel.ensure_not_cancelled()?;
                self.push(repo, remote, &branch, &upstream, cancel)?;
                Ok(SyncOutcome::Merged {
                    head: merged.to_string(),
                })
            }
        }
    }

    /// Fetch every branch of `remote`. Returns the remote's default branch
    /// when the transport advertised one.
    fn fetch(
        &self,
        repo: &Repository,
        remote: &RemoteConfig,
        cancel: &CancelFlag,
    ) -> Result<Option<String>, GitError> {
        let mut git_remote = repo.find_remote(&remote.name)?;
        let mut fo = FetchOptions::new();
        fo.remote_callbacks(remote_callbacks(&remote.credentials, repo.config().ok(), cancel));
        fo.prune(FetchPrune::On);

        debug!("Fetching from {}", remote.name);
        match git_remote.fetch(&[] as &[&str], Some(&mut fo), None) {
            Ok(()) => {}
            Err(_) if cancel.is_cancelled() => return Err(GitError::Cancelled),
            Err(e) => return Err(GitError::from_transport(e)),
        }

        let advertised = git_remote.default_branch().ok().and_then(|buf| {
            buf.as_str()
                .and_then(|name| name.strip_prefix("refs/heads/"))
                .map(str::to_string)
        });
        Ok(advertised)
    }

    /// Move the branch to `target`. The working tree is updated first, in
    /// safe mode, so local edits are never overwritten.
    fn fast_forward(&self, repo: &Repository, local_ref: &str, target: Oid) -> Result<(), GitError> {
        let tree = repo.find_commit(target)?.tree()?;
        checkout_safely(repo, &tree)?;

        let msg = format!("fast-forward: {} to {}", local_ref, target);
        repo.reference(local_ref, target, true, &msg)?;
        repo.set_head(local_ref)?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn merge(
        &self,
        repo: &Repository,
        remote: &RemoteConfig,
        branch: &str,
        upstream: &str,
        ours: Oid,
        theirs: Oid,
        signature: &Signature,
    ) -> Result<Oid, GitError> {
        let our_commit = repo.find_commit(ours)?;
        let their_commit = repo.find_commit(theirs)?;
        let ancestor = match repo.merge_base(ours, theirs) {
            Ok(base) => repo.find_commit(base)?.tree()?,
            Err(e) if e.code() == ErrorCode::NotFound => empty_tree(repo)?,
            Err(e) => return Err(e.into()),
        };

        let mut merged = repo.merge_trees(&ancestor, &our_commit.tree()?, &their_commit.tree()?, None)?;
        if merged.has_conflicts() {
            let mut paths: Vec<String> = merged
                .conflicts()?
                .filter_map(Result::ok)
                .filter_map(|c| c.our.or(c.their).or(c.ancestor))
                .map(|entry| String::from_utf8_lossy(&entry.path).into_owned())
                .collect();
            paths.sort();
            paths.dedup();
            warn!("Merge of {} aborted, conflicts in {:?}", branch, paths);
            return Err(GitError::MergeConflict(paths));
        }

        let tree = repo.find_tree(merged.write_tree_to(repo)?)?;
        checkout_safely(repo, &tree)?;

        let sig = signature.to_git()?;
        let msg = format!("Merge {}/{} into {}", remote.name, upstream, branch);
        let merge_commit = repo.commit(Some("HEAD"), &sig, &sig, &msg, &tree, &[&our_commit, &their_commit]);

        match merge_commit {
            Ok(id) => {
                info!("Merged {}/{} into {} as {}", remote.name, upstream, branch, id);
                Ok(id)
            }
            Err(e) => {
                let restored = our_commit
                    .tree()
                    .and_then(|ours| restore_pre_merge(repo, &tree, &ours));
                if let Err(restore_err) = restored {
                    warn!("Failed to restore tree after merge error: {}", restore_err);
                }
                Err(e.into())
            }
        }
    }

    fn push(
        &self,
        repo: &Repository,
        remote: &RemoteConfig,
        branch: &str,
        upstream: &str,
        cancel: &CancelFlag,
    ) -> Result<(), GitError> {
        cancel.ensure_not_cancelled()?;
        let mut git_remote = repo.find_remote(&remote.name)?;
        let refspec = format!("refs/heads/{}:refs/heads/{}", branch, upstream);
        let push_error: RefCell<Option<String>> = RefCell::new(None);

        {
            let mut callbacks = remote_callbacks(&remote.credentials, repo.config().ok(), cancel);
            callbacks.push_update_reference(|_ref_name, status| {
                if let Some(msg) = status {
                    *push_error.borrow_mut() = Some(msg.to_string());
                }
                Ok(())
            });
            let mut po = PushOptions::new();
            po.remote_callbacks(callbacks);

            if let Err(e) = git_remote.push(&[refspec.as_str()], Some(&mut po)) {
                if cancel.is_cancelled() {
                    return Err(GitError::Cancelled);
                }
                return Err(push_failure(e));
            }
        }

        if let Some(msg) = push_error.into_inner() {
            return Err(GitError::PushRejected(msg));
        }

        info!("Pushed {} to {}/{}", branch, remote.name, upstream);
        Ok(())
    }
}

/// The remote branch `branch` syncs with when none is configured.
///
/// Prefers the same name, then the branch the remote advertises as its
/// default, then the remote's only branch. A remote without branches keeps
/// `branch`, so the first push creates it there.
fn resolve_upstream(
    repo: &Repository,
    remote: &str,
    branch: &str,
    advertised: Option<&str>,
) -> Result<String, GitError> {
    let tracking = |name: &str| repo.refname_to_id(&format!("refs/remotes/{}/{}", remote, name)).is_ok();
    if tracking(branch) {
        return Ok(branch.to_string());
    }

    let remote_head = repo
        .find_reference(&format!("refs/remotes/{}/HEAD", remote))
        .ok()
        .and_then(|r| r.symbolic_target().map(str::to_string))
        .and_then(|target| {
            target
                .strip_prefix(&format!("refs/remotes/{}/", remote))
                .map(str::to_string)
        });
    for candidate in advertised.map(str::to_string).into_iter().chain(remote_head) {
        if tracking(&candidate) {
            debug!("Using {}/{} as upstream of {}", remote, candidate, branch);
            return Ok(candidate);
        }
    }

    let prefix = format!("{}/", remote);
    let mut names = Vec::new();
    for entry in repo.branches(Some(BranchType::Remote))? {
        let (found, _) = entry?;
        if let Some(name) = found.name()?.and_then(|n| n.strip_prefix(&prefix)) {
            if name != "HEAD" {
                names.push(name.to_string());
            }
        }
    }

    match names.len() {
        0 => Ok(branch.to_string()),
        1 => {
            let only = names.remove(0);
            debug!("Using {}/{} as upstream of {}", remote, only, branch);
            Ok(only)
        }
        _ => {
            names.sort();
            Err(GitError::UpstreamNotFound {
                remote: remote.to_string(),
                branch: branch.to_string(),
                candidates: names,
            })
        }
    }
}

/// Map a failed push to `PushRejected` when the remote (or libgit2's own
/// fast-forward check) refused the update.
fn push_failure(err: git2::Error) -> GitError {
    let msg = err.message().to_string();
    if err.code() == ErrorCode::NotFastForward
        || msg.contains("non-fast-forward")
        || msg.contains("fetch first")
    {
        return GitError::PushRejected(msg);
    }
    GitError::from_transport(err)
}

/// Undo the checkout of `merged`: only paths still matching the merged tree
/// go back to `ours`, so other uncommitted edits stay on disk.
fn restore_pre_merge(repo: &Repository, merged: &Tree<'_>, ours: &Tree<'_>) -> Result<(), git2::Error> {
    let mut restore = CheckoutBuilder::new();
    restore.safe().baseline(merged.clone());
    repo.checkout_tree(ours.as_object(), Some(&mut restore))
}

/// Credential and progress callbacks shared by fetch, push and clone.
pub(crate) fn remote_callbacks<'a>(
    credentials: &'a Credentials,
    config: Option<git2::Config>,
    cancel: &'a CancelFlag,
) -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();
    let mut attempts = 0;

    callbacks.credentials(move |url, username_from_url, allowed| {
        attempts += 1;
        if attempts > MAX_CREDENTIAL_ATTEMPTS {
            return Err(git2::Error::new(
                ErrorCode::Auth,
                ErrorClass::Net,
                "credentials rejected by remote",
            ));
        }

        match credentials {
            Credentials::UserPassword { username, password } if allowed.is_user_pass_plaintext() => {
                return Cred::userpass_plaintext(username, password);
            }
            Credentials::SshKey {
                username,
                private_key_path,
                passphrase,
            } if allowed.is_ssh_key() => {
                return Cred::ssh_key(username, None, private_key_path, passphrase.as_deref());
            }
            _ => {}
        }

        if allowed.is_ssh_key() {
            if let Some(user) = username_from_url {
                return Cred::ssh_key_from_agent(user);
            }
        }
        if allowed.is_user_pass_plaintext() {
            if let Some(cfg) = &config {
                if let Ok(cred) = Cred::credential_helper(cfg, url, username_from_url) {
                    return Ok(cred);
                }
            }
        }
        if allowed.is_username() {
            return Cred::username(username_from_url.unwrap_or("git"));
        }
        Cred::default()
    });

    callbacks.transfer_progress(move |_progress| !cancel.is_cancelled());
    callbacks
}

/// `None` when neither side has any commits.
fn relation_between(
    repo: &Repository,
    local: Option<Oid>,
    theirs: Option<Oid>,
) -> Result<Option<HistoryRelation>, GitError> {
    let relation = match (local, theirs) {
        (None, None) => return Ok(None),
        (Some(_), None) => HistoryRelation::RemoteMissing,
        (None, Some(_)) => HistoryRelation::LocalUnborn,
        (Some(l), Some(r)) if l == r => HistoryRelation::Same,
        (Some(l), Some(r)) => {
            if repo.graph_descendant_of(l, r)? {
                HistoryRelation::LocalAhead
            } else if repo.graph_descendant_of(r, l)? {
                HistoryRelation::RemoteAhead
            } else {
                HistoryRelation::Diverged
            }
        }
    };
    Ok(Some(relation))
}

fn head_commit(repo: &Repository) -> Result<Option<git2::Commit<'_>>, GitError> {
    match repo.head() {
        Ok(head) => Ok(Some(head.peel_to_commit()?)),
        Err(e) if is_unborn(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn empty_tree(repo: &Repository) -> Result<Tree<'_>, GitError> {
    let id = repo.treebuilder(None)?.write()?;
    Ok(repo.find_tree(id)?)
}

/// Paths the remote changed since the merge base (everything, if there is
/// no shared history).
fn incoming_paths(repo: &Repository, local: Option<Oid>, theirs: Oid) -> Result<Vec<String>, GitError> {
    let base_tree = match local {
        Some(l) => match repo.merge_base(l, theirs) {
            Ok(base) => Some(repo.find_commit(base)?.tree()?),
            Err(e) if e.code() == ErrorCode::NotFound => None,
            Err(e) => return Err(e.into()),
        },
        None => None,
    };
    let their_tree = repo.find_commit(theirs)?.tree()?;
    let diff = repo.diff_tree_to_tree(base_tree.as_ref(), Some(&their_tree), None)?;

    let mut paths: Vec<String> = diff
        .deltas()
        .flat_map(|delta| [delta.old_file().path(), delta.new_file().path()])
        .flatten()
        .filter_map(|p| p.to_str().map(str::to_string))
        .collect();
    paths.sort();
    paths.dedup();
    Ok(paths)
}

/// Update the working tree to `tree` without overwriting local edits. A
/// refused checkout changes nothing on disk and is reported as a conflict.
fn checkout_safely(repo: &Repository, tree: &Tree<'_>) -> Result<(), GitError> {
    let conflicts: RefCell<Vec<String>> = RefCell::new(Vec::new());
    let result = {
        let mut checkout = CheckoutBuilder::new();
        checkout
            .safe()
            .notify_on(CheckoutNotificationType::CONFLICT)
            .notify(|_kind, path, _baseline, _target, _workdir| {
                if let Some(path) = path.and_then(|p| p.to_str()) {
                    conflicts.borrow_mut().push(path.to_string());
                }
                true
            });
        repo.checkout_tree(tree.as_object(), Some(&mut checkout))
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) if e.code() == ErrorCode::Conflict => {
            let mut paths = conflicts.into_inner();
            paths.sort();
            paths.dedup();
            Err(GitError::MergeConflict(paths))
        }
        Err(e) => Err(e.into()),
    }
}
