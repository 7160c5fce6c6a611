//! Single-flight sync state and cooperative cancellation.
//!
//! Every open repository owns one `SyncToken`. A sync, commit or background
//! cycle must hold the token's `SyncGuard` for its whole run; a second
//! request while the token is `Running` is turned away instead of running
//! concurrently. Dropping the guard returns the token to `Idle`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::error::Cancelled;

/// Shared cancellation flag, checked at safe checkpoints by long operations.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Checkpoint: `Err(Cancelled)` once cancellation was requested.
    pub fn ensure_not_cancelled(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Running { started_at: DateTime<Utc> },
}

/// Observable sync state for one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncState {
    pub phase: SyncPhase,
    /// End of the last run that finished successfully.
    pub last_completed_at: Option<DateTime<Utc>>,
}

impl SyncState {
    pub fn is_running(&self) -> bool {
        matches!(self.phase, SyncPhase::Running { .. })
    }
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            phase: SyncPhase::Idle,
            last_completed_at: None,
        }
    }
}

#[derive(Debug)]
struct TokenInner {
    state: watch::Sender<SyncState>,
    cancel: CancelFlag,
}

/// Per-repository single-flight token.
#[derive(Debug, Clone)]
pub struct SyncToken {
    inner: Arc<TokenInner>,
}

impl Default for SyncToken {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncToken {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SyncState::default());
        Self {
            inner: Arc::new(TokenInner {
                state,
                cancel: CancelFlag::new(),
            }),
        }
    }

    /// Move from `Idle` to `Running`. Returns `None` if a run is in flight.
    pub fn try_acquire(&self) -> Option<SyncGuard> {
        let started_at = Utc::now();
        let acquired = self.inner.state.send_if_modified(|state| {
            if state.is_running() {
                false
            } else {
                state.phase = SyncPhase::Running { started_at };
                true
            }
        });

        if !acquired {
            return None;
        }

        self.inner.cancel.reset();
        Some(SyncGuard {
            inner: Arc::clone(&self.inner),
            succeeded: false,
        })
    }

    pub fn state(&self) -> SyncState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.inner.state.subscribe()
    }

    /// The flag long operations on this repository poll.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.inner.cancel.clone()
    }

    /// Ask the in-flight run (and any running index rebuild) to stop at its
    /// next checkpoint.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    /// Clear a cancellation request once nothing is left to cancel.
    pub fn reset_cancel(&self) {
        self.inner.cancel.reset();
    }

    /// Wait until the token is back to `Idle`.
    pub async fn drain(&self) {
        let mut rx = self.inner.state.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|state| !state.is_running()).await;
    }
}

/// Held for the duration of one sync run; releases the token on drop.
#[derive(Debug)]
pub struct SyncGuard {
    inner: Arc<TokenInner>,
    succeeded: bool,
}

impl SyncGuard {
    pub fn cancel_flag(&self) -> CancelFlag {
        self.inner.cancel.clone()
    }

    /// Record the run as successful; `last_completed_at` is updated on release.
    pub fn mark_succeeded(&mut self) {
        self.succeeded = true;
    }
}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        let succeeded = self.succeeded;
        self.inner.state.send_modify(|state| {
            state.phase = SyncPhase::Idle;
            if succeeded {
                state.last_completed_at = Some(Utc::now());
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn second_acquire_is_rejected() {
        let token = SyncToken::new();
        let guard = token.try_acquire().expect("first acquire");
        assert!(token.state().is_running());
        assert!(token.try_acquire().is_none());

        drop(guard);
        assert!(!token.state().is_running());
        assert!(token.try_acquire().is_some());
    }

    #[test]
    fn success_records_completion_time() {
        let token = SyncToken::new();
        {
            let _failed = token.try_acquire().unwrap();
        }
        assert!(token.state().last_completed_at.is_none());

        {
            let mut guard = token.try_acquire().unwrap();
            guard.mark_succeeded();
        }
        assert!(token.state().last_completed_at.is_some());
    }

    #[test]
    fn acquire_clears_stale_cancellation() {
        let token = SyncToken::new();
        token.cancel();
        let guard = token.try_acquire().unwrap();
        assert!(!guard.cancel_flag().is_cancelled());
    }

    #[test]
    fn cancel_flag_checkpoint() {
        let flag = CancelFlag::new();
        assert!(flag.ensure_not_cancelled().is_ok());
        flag.cancel();
        assert_eq!(flag.ensure_not_cancelled(), Err(Cancelled));
    }

    #[tokio::test]
    async fn drain_waits_for_release() {
        let token = SyncToken::new();
        let guard = token.try_acquire().unwrap();

        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.drain().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("drain should finish")
            .unwrap();
    }
}
