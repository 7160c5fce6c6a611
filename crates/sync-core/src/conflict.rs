//! Sync-time decision between local state and fetched remote history.
//!
//! `decide` is a pure function: the engine computes how the two branches
//! relate and which paths each side touched, and the policy picks what to
//! do before anything on disk changes.

use std::collections::BTreeSet;

/// How the local branch tip relates to the fetched remote tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryRelation {
    /// The remote branch does not exist yet.
    RemoteMissing,
    /// Both tips are the same commit.
    Same,
    /// The remote is an ancestor of local.
    LocalAhead,
    /// Local is an ancestor of the remote.
    RemoteAhead,
    /// The local branch has no commits.
    LocalUnborn,
    Diverged,
}

/// What the engine should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncPlan {
    UpToDate,
    /// Only push local commits.
    PushOnly,
    /// Move the local branch to the remote tip.
    FastForward,
    /// Merge the remote tip into local, then push.
    Merge,
    /// Stop without touching the working tree.
    Abort { paths: Vec<String> },
}

/// Handling of uncommitted local changes during sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DirtyTree {
    /// Go ahead unless a dirty path is also changed by the remote.
    #[default]
    KeepNonOverlapping,
    /// Abort whenever remote changes would be applied to a dirty tree.
    Refuse,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConflictPolicy {
    pub dirty_tree: DirtyTree,
}

impl ConflictPolicy {
    /// `dirty` are uncommitted local paths, `incoming` the paths the remote
    /// changed since the merge base. Both are relative to the root.
    pub fn decide(
        &self,
        relation: HistoryRelation,
        dirty: &[String],
        incoming: &[String],
    ) -> SyncPlan {
        let plan = match relation {
            HistoryRelation::RemoteMissing | HistoryRelation::LocalAhead => {
                return SyncPlan::PushOnly
            }
            HistoryRelation::Same => return SyncPlan::UpToDate,
            HistoryRelation::RemoteAhead | HistoryRelation::LocalUnborn => SyncPlan::FastForward,
            HistoryRelation::Diverged => SyncPlan::Merge,
        };

        let blocked = match self.dirty_tree {
            DirtyTree::KeepNonOverlapping => overlapping(dirty, incoming),
            DirtyTree::Refuse if incoming.is_empty() => Vec::new(),
            DirtyTree::Refuse => sorted_unique(dirty),
        };

        if blocked.is_empty() {
            plan
        } else {
            SyncPlan::Abort { paths: blocked }
        }
    }
}

/// Paths present on both sides. A dirty folder entry also blocks incoming
/// files beneath it.
fn overlapping(dirty: &[String], incoming: &[String]) -> Vec<String> {
    let mut result = BTreeSet::new();
    for d in dirty {
        let d = d.trim_end_matches('/');
        for i in incoming {
            if i == d || i.starts_with(&format!("{}/", d)) {
                result.insert(i.clone());
            }
        }
    }
    result.into_iter().collect()
}

fn sorted_unique(paths: &[String]) -> Vec<String> {
    paths
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
