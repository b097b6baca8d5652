//! Readiness coordination for backend clients
//!
//! Each backend client embeds a [`ReadinessCoordinator`] so that its
//! `initialize()` runs at most once no matter how many callers race on it,
//! and implements [`Readiness`] so other components can block on it with
//! [`wait_for_ready`].
//!
//! # State machine
//!
//! ```text
//! Idle ──ensure_initialized──▶ Initializing ──ok──▶ Initialized
//!  ▲                               │
//!  └──────────reset()──────────────┴──err──▶ Failed
//! ```
//!
//! `Initialized` and `Failed` are settled. `reset()` is the only way back
//! to `Idle` and is refused while an attempt is in flight.

use crate::providers::{ProviderError, ProviderResult};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default deadline for [`wait_for_ready`]
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default pause between readiness re-checks
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Initialization lifecycle of one backend client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InitializationState {
    Idle,
    Initializing,
    Initialized,
    Failed,
}

impl InitializationState {
    /// `Initialized` or `Failed`
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            InitializationState::Initialized | InitializationState::Failed
        )
    }
}

impl fmt::Display for InitializationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InitializationState::Idle => "idle",
            InitializationState::Initializing => "initializing",
            InitializationState::Initialized => "initialized",
            InitializationState::Failed => "failed",
        };
        f.write_str(s)
    }
}

type InitAttempt = Shared<BoxFuture<'static, ProviderResult<()>>>;

enum Slot {
    Idle,
    Initializing(InitAttempt),
    Initialized(DateTime<Utc>),
    Failed(ProviderError),
}

impl Slot {
    fn state(&self) -> InitializationState {
        match self {
            Slot::Idle => InitializationState::Idle,
            Slot::Initializing(_) => InitializationState::Initializing,
            Slot::Initialized(_) => InitializationState::Initialized,
            Slot::Failed(_) => InitializationState::Failed,
        }
    }
}

/// Single-flight initialization barrier
///
/// Cloning yields a handle onto the same state.
#[derive(Clone)]
pub struct ReadinessCoordinator {
    backend: &'static str,
    slot: Arc<Mutex<Slot>>,
}

impl fmt::Debug for ReadinessCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadinessCoordinator")
            .field("backend", &self.backend)
            .field("state", &self.state())
            .finish()
    }
}

impl ReadinessCoordinator {
    pub fn new(backend: &'static str) -> Self {
        Self {
            backend,
            slot: Arc::new(Mutex::new(Slot::Idle)),
        }
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    pub fn state(&self) -> InitializationState {
        lock(&self.slot).state()
    }

    /// When the last successful initialization settled
    pub fn initialized_at(&self) -> Option<DateTime<Utc>> {
        match &*lock(&self.slot) {
            Slot::Initialized(at) => Some(*at),
            _ => None,
        }
    }

    /// Run `init` unless an attempt already exists
    ///
    /// Settled states return immediately (`Failed` returns the stored
    /// error). While `Initializing`, callers join the in-flight attempt and
    /// `init` is never invoked. The attempt is spawned onto the runtime, so
    /// it runs to completion even if every caller stops waiting.
    pub async fn ensure_initialized<F, Fut>(&self, init: F) -> ProviderResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ProviderResult<()>> + Send + 'static,
    {
        let attempt = {
            let mut slot = lock(&self.slot);
            match &*slot {
                Slot::Initialized(_) => return Ok(()),
                Slot::Failed(err) => return Err(err.clone()),
                Slot::Initializing(attempt) => {
                    debug!(backend = self.backend, "Joining in-flight initialization");
                    attempt.clone()
                }
                Slot::Idle => {
                    debug!(backend = self.backend, "Starting initialization");
                    let settle_into = Arc::clone(&self.slot);
                    let work = init();
                    let attempt: InitAttempt = async move {
                        let outcome = work.await;
                        *lock(&settle_into) = match &outcome {
                            Ok(()) => Slot::Initialized(Utc::now()),
                            Err(err) => Slot::Failed(err.clone()),
                        };
                        outcome
                    }
                    .boxed()
                    .shared();
                    *slot = Slot::Initializing(attempt.clone());
                    tokio::spawn(attempt.clone());
                    attempt
                }
            }
        };
        attempt.await
    }

    /// Return to `Idle` so the next `ensure_initialized` starts afresh
    ///
    /// Refused (returns `false`) while an attempt is in flight.
    pub fn reset(&self) -> bool {
        let mut slot = lock(&self.slot);
        if matches!(&*slot, Slot::Initializing(_)) {
            return false;
        }
        *slot = Slot::Idle;
        true
    }
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Readiness surface shared by every backend client
#[async_trait::async_trait]
pub trait Readiness: Send + Sync {
    /// Backend name used in errors and logs
    fn backend(&self) -> &'static str;

    /// Disabled backends are trivially ready
    fn is_enabled(&self) -> bool;

    /// Ready to serve live queries
    fn is_ready(&self) -> bool;

    fn state(&self) -> InitializationState;

    /// Start or join initialization and return its settled outcome
    async fn ensure_initialized(&self) -> ProviderResult<()>;
}

/// Block until `target` is ready, bounded by `timeout`
///
/// - ready: returns `Ok(())` immediately
/// - enabled and settled into `Failed`: `PermanentFailure`
/// - `Initialized` but not ready (degraded): `NotOperational`
/// - otherwise drives `ensure_initialized`, logging failures, and re-checks
///   every `retry_interval` until the deadline, then `InitializationTimeout`
pub async fn wait_for_ready<R>(
    target: &R,
    timeout: Duration,
    retry_interval: Duration,
) -> ProviderResult<()>
where
    R: Readiness + ?Sized,
{
    let backend = target.backend();
    let deadline = Instant::now() + timeout;
    let timed_out = || ProviderError::InitializationTimeout {
        backend,
        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
    };
    let mut attempt: u32 = 0;

    loop {
        if target.is_ready() {
            return Ok(());
        }

        match target.state() {
            InitializationState::Failed if target.is_enabled() => {
                let cause = match target.ensure_initialized().await {
                    Err(err) => err,
                    Ok(()) => ProviderError::Unavailable(format!("{} failed", backend)),
                };
                return Err(ProviderError::PermanentFailure {
                    backend,
                    cause: Box::new(cause),
                });
            }
            InitializationState::Initialized => {
                return Err(ProviderError::NotOperational { backend });
            }
            _ => {}
        }

        if Instant::now() >= deadline {
            return Err(timed_out());
        }

        attempt += 1;
        match tokio::time::timeout_at(deadline, target.ensure_initialized()).await {
            Ok(Ok(())) => {
                if target.is_ready() {
                    return Ok(());
                }
                if target.state() == InitializationState::Initialized {
                    return Err(ProviderError::NotOperational { backend });
                }
            }
            Ok(Err(err)) => {
                warn!(backend, attempt, error = %err, "Initialization attempt failed while waiting for readiness");
            }
            Err(_) => return Err(timed_out()),
        }

        let next_check = (Instant::now() + retry_interval).min(deadline);
        tokio::time::sleep_until(next_check).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Behaviour of the fake backend's initialization
    #[derive(Clone, Copy)]
    enum Outcome {
        Operational,
        Degraded,
        Fail,
        Hang,
    }

    struct FakeBackend {
        enabled: bool,
        outcome: Outcome,
        coordinator: ReadinessCoordinator,
        operational: Arc<AtomicBool>,
        attempts: Arc<AtomicUsize>,
    }

    impl FakeBackend {
        fn new(enabled: bool, outcome: Outcome) -> Self {
            Self {
                enabled,
                outcome,
                coordinator: ReadinessCoordinator::new("fake"),
                operational: Arc::new(AtomicBool::new(false)),
                attempts: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait::async_trait]
    impl Readiness for FakeBackend {
        fn backend(&self) -> &'static str {
            "fake"
        }

        fn is_enabled(&self) -> bool {
            self.enabled
        }

        fn is_ready(&self) -> bool {
            !self.enabled
                || (self.state() == InitializationState::Initialized
                    && self.operational.load(Ordering::SeqCst))
        }

        fn state(&self) -> InitializationState {
            self.coordinator.state()
        }

        async fn ensure_initialized(&self) -> ProviderResult<()> {
            let outcome = self.outcome;
            let operational = Arc::clone(&self.operational);
            let attempts = Arc::clone(&self.attempts);
            self.coordinator
                .ensure_initialized(move || async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    match outcome {
                        Outcome::Operational => {
                            operational.store(true, Ordering::SeqCst);
                            Ok(())
                        }
                        Outcome::Degraded => Ok(()),
                        Outcome::Fail => Err(ProviderError::AuthenticationFailed("denied".into())),
                        Outcome::Hang => std::future::pending().await,
                    }
                })
                .await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_attempt() {
        let backend = FakeBackend::new(true, Outcome::Operational);

        let results =
            futures::future::join_all((0..16).map(|_| backend.ensure_initialized())).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(backend.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(backend.state(), InitializationState::Initialized);
        assert!(backend.coordinator.initialized_at().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_the_same_failure() {
        let backend = FakeBackend::new(true, Outcome::Fail);

        let results =
            futures::future::join_all((0..8).map(|_| backend.ensure_initialized())).await;

        let expected = ProviderError::AuthenticationFailed("denied".into());
        assert!(results.iter().all(|r| r.as_ref().err() == Some(&expected)));
        assert_eq!(backend.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(backend.state(), InitializationState::Failed);

        // Settled failure is replayed, not retried
        assert_eq!(backend.ensure_initialized().await, Err(expected));
        assert_eq!(backend.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_allows_a_new_attempt() {
        let backend = FakeBackend::new(true, Outcome::Fail);
        assert!(backend.ensure_initialized().await.is_err());

        assert!(backend.coordinator.reset());
        assert_eq!(backend.state(), InitializationState::Idle);

        assert!(backend.ensure_initialized().await.is_err());
        assert_eq!(backend.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_refused_while_in_flight() {
        let backend = Arc::new(FakeBackend::new(true, Outcome::Operational));
        let runner = Arc::clone(&backend);
        let handle = tokio::spawn(async move { runner.ensure_initialized().await });

        tokio::task::yield_now().await;
        assert_eq!(backend.state(), InitializationState::Initializing);
        assert!(!backend.coordinator.reset());

        assert!(handle.await.unwrap().is_ok());
        assert_eq!(backend.state(), InitializationState::Initialized);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_survives_caller_timeout() {
        let backend = FakeBackend::new(true, Outcome::Operational);

        let abandoned =
            tokio::time::timeout(Duration::from_millis(10), backend.ensure_initialized()).await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(backend.state(), InitializationState::Initialized);
        assert_eq!(backend.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_ready_succeeds() {
        let backend = FakeBackend::new(true, Outcome::Operational);
        wait_for_ready(&backend, Duration::from_secs(1), Duration::from_millis(200))
            .await
            .unwrap();
        assert!(backend.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_ready_disabled_is_immediate() {
        let backend = FakeBackend::new(false, Outcome::Hang);
        wait_for_ready(&backend, Duration::from_secs(1), Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(backend.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_ready_times_out_within_one_interval() {
        let backend = FakeBackend::new(true, Outcome::Hang);
        let started = Instant::now();

        let err = wait_for_ready(&backend, Duration::from_millis(1_000), Duration::from_millis(200))
            .await
            .unwrap_err();

        let waited = started.elapsed();
        assert_eq!(
            err,
            ProviderError::InitializationTimeout {
                backend: "fake",
                timeout_ms: 1_000
            }
        );
        assert!(waited >= Duration::from_millis(1_000));
        assert!(waited <= Duration::from_millis(1_200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_ready_permanent_failure() {
        let backend = FakeBackend::new(true, Outcome::Fail);
        let err = wait_for_ready(&backend, Duration::from_secs(5), Duration::from_millis(200))
            .await
            .unwrap_err();

        match err {
            ProviderError::PermanentFailure { backend, cause } => {
                assert_eq!(backend, "fake");
                assert!(matches!(*cause, ProviderError::AuthenticationFailed(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(backend.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_ready_degraded_stops_waiting() {
        let backend = FakeBackend::new(true, Outcome::Degraded);
        let started = Instant::now();
        let err = wait_for_ready(&backend, Duration::from_secs(5), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::NotOperational { backend: "fake" });
        // returns once the attempt settles, without a retry sleep
        assert!(started.elapsed() < Duration::from_millis(200));
        assert_eq!(backend.attempts.load(Ordering::SeqCst), 1);
    }
}
