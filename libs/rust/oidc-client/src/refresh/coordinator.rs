//! Single-flight refresh coordination.
//!
//! The coordinator holds two pieces of state:
//! - a lock flag, set for as long as a refresh is running, and
//! - an in-flight slot holding the running refresh as a shared future.
//!
//! In shared-flight mode every caller that finds the slot occupied awaits the
//! same future and receives the same outcome. A failed flight runs its
//! teardown while it still holds the slot, so nobody can start a new refresh
//! with credentials the failed one is about to discard. The flag alone backs
//! the legacy polling mode, where waiters poll it with a bounded backoff.

use crate::config::PollConfig;
use crate::error::{TokenError, TokenResult};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

type FlightFuture = Shared<BoxFuture<'static, TokenResult<()>>>;

/// Handle on a running refresh. Cloning it joins the same refresh.
#[derive(Clone)]
pub struct Flight {
    outcome: FlightFuture,
    teardown_requested: Arc<AtomicBool>,
}

impl std::fmt::Debug for Flight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flight")
            .field(
                "teardown_requested",
                &self.teardown_requested.load(Ordering::SeqCst),
            )
            .finish_non_exhaustive()
    }
}

impl Flight {
    /// Wait for the refresh to finish.
    ///
    /// # Errors
    ///
    /// Returns the refresh error; every joiner receives the same one.
    pub async fn wait(&self) -> TokenResult<()> {
        self.outcome.clone().await
    }

    /// Ask for the flight's teardown to run if it fails.
    ///
    /// Must be called while holding the slot: the flight decides under the
    /// same lock, so a request made by any caller that joined is honoured.
    pub fn request_teardown(&self) {
        self.teardown_requested.store(true, Ordering::SeqCst);
    }
}

/// Lock flag plus in-flight slot.
#[derive(Debug, Default)]
pub struct RefreshCoordinator {
    locked: AtomicBool,
    inflight: Mutex<Option<Flight>>,
}

/// Clears the lock flag when dropped.
#[derive(Debug)]
pub struct LockGuard<'a> {
    locked: &'a AtomicBool,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.locked.store(false, Ordering::SeqCst);
    }
}

impl RefreshCoordinator {
    /// Create an idle coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a refresh is running.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    /// Set the lock flag until the returned guard is dropped.
    #[must_use]
    pub fn hold_lock(&self) -> LockGuard<'_> {
        self.locked.store(true, Ordering::SeqCst);
        LockGuard {
            locked: &self.locked,
        }
    }

    /// Lock the in-flight slot. Callers check for a running flight and start
    /// one while holding this guard, so two flights can never overlap.
    pub async fn slot(&self) -> MutexGuard<'_, Option<Flight>> {
        self.inflight.lock().await
    }

    /// Start `refresh` as the shared flight stored in `slot`.
    ///
    /// The lock flag is set before `refresh` is first polled. When `refresh`
    /// completes the flight takes the slot lock; if it failed and a teardown
    /// was requested, `teardown` runs there. Only then are the slot emptied
    /// and the flag cleared, before any joiner observes the result.
    pub fn start<F, T, TF>(
        self: &Arc<Self>,
        slot: &mut Option<Flight>,
        refresh: F,
        teardown: T,
    ) -> Flight
    where
        F: Future<Output = TokenResult<()>> + Send + 'static,
        T: FnOnce(TokenError) -> TF + Send + 'static,
        TF: Future<Output = ()> + Send + 'static,
    {
        self.locked.store(true, Ordering::SeqCst);

        let coordinator = Arc::clone(self);
        let teardown_requested = Arc::new(AtomicBool::new(false));
        let requested = Arc::clone(&teardown_requested);
        let outcome = async move {
            let result = refresh.await;

            let mut slot = coordinator.inflight.lock().await;
            if let Err(err) = &result {
                if requested.load(Ordering::SeqCst) {
                    teardown(err.clone()).await;
                }
            }
            slot.take();
            coordinator.locked.store(false, Ordering::SeqCst);
            result
        }
        .boxed()
        .shared();

        let flight = Flight {
            outcome,
            teardown_requested,
        };
        *slot = Some(flight.clone());
        flight
    }

    /// Poll the lock flag until it clears or `poll.max_attempts` polls have
    /// been made. Returns whether the lock was observed released.
    pub async fn wait_for_release(&self, poll: &PollConfig) -> bool {
        for attempt in 0..poll.max_attempts {
            if !self.is_locked() {
                return true;
            }
            let delay = poll.delay_for_attempt(attempt);
            debug!(attempt, delay_ms = delay.as_millis(), "Refresh lock held, waiting");
            tokio::time::sleep(delay).await;
        }
        !self.is_locked()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TokenError;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_flight_releases_slot_and_flag() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let flight = {
            let mut slot = coordinator.slot().await;
            coordinator.start(&mut slot, async { Ok(()) }, |_| async {})
        };

        assert!(coordinator.is_locked());
        assert!(flight.wait().await.is_ok());
        assert!(!coordinator.is_locked());
        assert!(coordinator.slot().await.is_none());
    }

    #[tokio::test]
    async fn test_failed_flight_still_releases() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let flight = {
            let mut slot = coordinator.slot().await;
            coordinator.start(&mut slot, async { Err(TokenError::Forbidden) }, |_| async {})
        };

        assert!(matches!(flight.wait().await, Err(TokenError::Forbidden)));
        assert!(!coordinator.is_locked());
        assert!(coordinator.slot().await.is_none());
    }

    #[tokio::test]
    async fn test_joiners_share_one_execution() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let flight = {
            let runs = Arc::clone(&runs);
            let mut slot = coordinator.slot().await;
            coordinator.start(
                &mut slot,
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Err(TokenError::protocol("empty"))
                },
                |_| async {},
            )
        };
        let joined = coordinator.slot().await.clone().unwrap();

        let (a, b) = tokio::join!(flight.wait(), joined.wait());
        assert!(matches!(a, Err(TokenError::ProtocolViolation(_))));
        assert!(matches!(b, Err(TokenError::ProtocolViolation(_))));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_teardown_runs_before_release() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let locked_during_teardown = Arc::new(AtomicBool::new(false));

        let flight = {
            let runs = Arc::clone(&runs);
            let seen = Arc::clone(&locked_during_teardown);
            let observed = Arc::clone(&coordinator);
            let mut slot = coordinator.slot().await;
            let flight = coordinator.start(
                &mut slot,
                async { Err(TokenError::Forbidden) },
                move |err| async move {
                    assert!(matches!(err, TokenError::Forbidden));
                    seen.store(observed.is_locked(), Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    runs.fetch_add(1, Ordering::SeqCst);
                },
            );
            flight.request_teardown();
            flight
        };
        let joined = flight.clone();

        let (a, b) = tokio::join!(flight.wait(), joined.wait());
        assert!(a.is_err() && b.is_err());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(locked_during_teardown.load(Ordering::SeqCst));
        assert!(!coordinator.is_locked());
        assert!(coordinator.slot().await.is_none());
    }

    #[tokio::test]
    async fn test_teardown_skipped_unless_requested() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let flight = {
            let runs = Arc::clone(&runs);
            let mut slot = coordinator.slot().await;
            coordinator.start(
                &mut slot,
                async { Err(TokenError::Forbidden) },
                move |_| async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                },
            )
        };

        assert!(flight.wait().await.is_err());
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_teardown_skipped_on_success() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let flight = {
            let runs = Arc::clone(&runs);
            let mut slot = coordinator.slot().await;
            coordinator.start(&mut slot, async { Ok(()) }, move |_| async move {
                runs.fetch_add(1, Ordering::SeqCst);
            })
        };
        flight.request_teardown();

        assert!(flight.wait().await.is_ok());
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_lock_guard_clears_flag() {
        let coordinator = RefreshCoordinator::new();
        {
            let _guard = coordinator.hold_lock();
            assert!(coordinator.is_locked());
        }
        assert!(!coordinator.is_locked());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_release_gives_up() {
        let coordinator = RefreshCoordinator::new();
        let _guard = coordinator.hold_lock();

        let started = tokio::time::Instant::now();
        assert!(!coordinator.wait_for_release(&PollConfig::default()).await);
        assert!(started.elapsed() >= PollConfig::default().worst_case_wait());
    }

    #[tokio::test]
    async fn test_wait_for_release_when_idle() {
        let coordinator = RefreshCoordinator::new();
        assert!(coordinator.wait_for_release(&PollConfig::default()).await);
    }
}
