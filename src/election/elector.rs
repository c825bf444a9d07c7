//! Leader Elector
//!
//! Drives the acquire/renew protocol against a lease store and turns the
//! outcome into leadership transitions.
//!
//! # Timing
//!
//! A leader steps down once `renew_deadline` has passed since the start of
//! its last successful renewal. The deadline is re-armed on every success
//! rather than counted once from entering the renew loop, so a leader that
//! keeps renewing keeps leading. Waits between attempts never run past the
//! deadline. Because `renew_deadline < lease_duration`, the leader stops
//! acting as leader before any other participant can consider the lease
//! expired, provided clocks agree to within the difference.
//!
//! # Atomicity
//!
//! Every write carries the `version` of the record it was derived from, so
//! a store with compare-and-swap updates rejects the loser when two
//! participants race for an expired lease. The loser sees a conflict and
//! retries on the next round.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::backoff::{jittered, sleep_or_cancel, JITTER_FACTOR};
use super::ElectionConfig;
use crate::error::Error;
use crate::lease::LeaseRecord;

/// Lifecycle phase of an elector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ElectorPhase {
    /// Constructed, `run()` not called yet
    Idle = 0,
    /// Trying to become leader
    Acquiring = 1,
    /// Holding the lease with leader work running
    Leading = 2,
    /// Terminal, after `stop()`
    Stopped = 3,
}

impl ElectorPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ElectorPhase::Idle,
            1 => ElectorPhase::Acquiring,
            2 => ElectorPhase::Leading,
            _ => ElectorPhase::Stopped,
        }
    }
}

/// Result of one protocol step
#[derive(Debug, Clone, PartialEq, Eq)]
enum Attempt {
    /// Lease created or taken over by us
    Acquired,
    /// Our own lease renewed
    Renewed,
    /// Someone else holds a live lease
    HeldByOther(String),
    /// Store error or lost write race
    Failed,
}

impl Attempt {
    fn succeeded(&self) -> bool {
        matches!(self, Attempt::Acquired | Attempt::Renewed)
    }
}

/// Why a leadership term ended
#[derive(Debug, Clone, PartialEq, Eq)]
enum StepDown {
    Stopped,
    DeadlineExceeded,
    LostTo(String),
    WorkFinished,
}

/// Lease-based leader elector
///
/// Share it behind an `Arc`: one task calls [`run`](Self::run), any other
/// task or thread may call [`stop`](Self::stop) and the read accessors.
pub struct Elector {
    config: ElectionConfig,
    running: AtomicBool,
    is_leader: AtomicBool,
    phase: AtomicU8,
    observed_leader: ArcSwapOption<String>,
    observed_lease: ArcSwapOption<LeaseRecord>,
    /// Cancelled by `stop()`; parent of every leader-work token
    shutdown: CancellationToken,
    /// Cancelled once `run()` has returned
    finished: CancellationToken,
}

impl Elector {
    /// Create an elector for a validated configuration
    pub fn new(config: ElectionConfig) -> Self {
        Self {
            config,
            running: AtomicBool::new(false),
            is_leader: AtomicBool::new(false),
            phase: AtomicU8::new(ElectorPhase::Idle as u8),
            observed_leader: ArcSwapOption::empty(),
            observed_lease: ArcSwapOption::empty(),
            shutdown: CancellationToken::new(),
            finished: CancellationToken::new(),
        }
    }

    /// The configuration this elector runs with
    pub fn config(&self) -> &ElectionConfig {
        &self.config
    }

    /// This participant's identity
    pub fn identity(&self) -> &str {
        self.config.identity()
    }

    /// Whether this participant currently believes it is leader
    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::SeqCst)
    }

    /// Most recently observed leader identity
    pub fn leader(&self) -> Option<String> {
        self.observed_leader.load_full().map(|leader| leader.as_ref().clone())
    }

    /// Most recently observed lease record
    pub fn observed_lease(&self) -> Option<LeaseRecord> {
        self.observed_lease.load_full().map(|lease| lease.as_ref().clone())
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> ElectorPhase {
        ElectorPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    /// Whether the election loop is active
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.shutdown.is_cancelled()
    }

    fn set_phase(&self, phase: ElectorPhase) {
        self.phase.store(phase as u8, Ordering::SeqCst);
    }

    /// Run the election until [`stop`](Self::stop) is called.
    ///
    /// Never fails: store errors are retried and callback failures are
    /// logged. Calling it while already running, or after a stop, logs a
    /// warning and returns immediately.
    pub async fn run(&self) {
        if self.phase() == ElectorPhase::Stopped {
            tracing::warn!("Elector {} already stopped, not starting", self.identity());
            return;
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("Elector {} already running", self.identity());
            return;
        }

        tracing::info!(
            "Starting leader election for lease {} (identity: {}, store: {})",
            self.config.lease_key(),
            self.identity(),
            self.config.store().backend()
        );

        loop {
            self.set_phase(ElectorPhase::Acquiring);
            let Some(acquired_at) = self.acquire().await else {
                break;
            };

            let reason = self.lead(acquired_at).await;
            if reason == StepDown::Stopped || !self.is_running() {
                if self.config.release_on_cancel() {
                    self.release().await;
                }
                break;
            }

            // Pace re-acquisition after a lost term like any other retry
            let delay = jittered(self.config.retry_period(), JITTER_FACTOR);
            if !sleep_or_cancel(delay, &self.shutdown).await {
                break;
            }
        }

        self.running.store(false, Ordering::SeqCst);
        self.set_phase(ElectorPhase::Stopped);
        self.finished.cancel();
        tracing::info!("Leader election stopped for {}", self.identity());
    }

    /// Stop the election.
    ///
    /// Idempotent and non-blocking, so it is safe from any thread and from
    /// inside a callback. Wakes any retry sleep and cancels leader work;
    /// `run()` then tears down and returns.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            tracing::info!("Stopping leader election for {}", self.identity());
        }
        self.shutdown.cancel();

        // Never started: nothing will flip the phase for us
        if self
            .phase
            .compare_exchange(
                ElectorPhase::Idle as u8,
                ElectorPhase::Stopped as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
        {
            self.finished.cancel();
        }
    }

    /// Stop and wait, bounded, for `run()` to return
    pub async fn shutdown(&self) {
        self.stop();

        let bound = self.config.retry_period() + self.config.drain_timeout() * 2;
        if tokio::time::timeout(bound, self.finished.cancelled()).await.is_err() {
            tracing::warn!(
                "Election loop for {} did not exit within {:?}",
                self.identity(),
                bound
            );
        }
    }

    /// Acquire loop. Returns when the winning attempt started, or `None`
    /// if stopped before acquiring.
    async fn acquire(&self) -> Option<Instant> {
        tracing::debug!("Attempting to acquire lease {}", self.config.lease_key());

        loop {
            if !self.is_running() {
                return None;
            }

            let attempted_at = Instant::now();
            let acquired = tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                acquired = self.try_acquire_or_renew() => acquired,
            };
            if acquired {
                return Some(attempted_at);
            }

            let delay = jittered(self.config.retry_period(), JITTER_FACTOR);
            if !sleep_or_cancel(delay, &self.shutdown).await {
                return None;
            }
        }
    }

    /// One leadership term: start work, renew until something ends it, tear down.
    async fn lead(&self, acquired_at: Instant) -> StepDown {
        self.is_leader.store(true, Ordering::SeqCst);
        self.set_phase(ElectorPhase::Leading);
        tracing::info!(
            "{} became leader of {}",
            self.identity(),
            self.config.lease_key()
        );

        let work_token = self.shutdown.child_token();
        let callbacks = Arc::clone(self.config.callbacks());
        let token = work_token.clone();
        let mut work = tokio::spawn(async move { callbacks.on_start_leading(token).await });

        let reason = self.renew(&mut work, acquired_at).await;
        match &reason {
            StepDown::Stopped => tracing::info!("Leadership released by stop"),
            StepDown::DeadlineExceeded => tracing::warn!(
                "{} failed to renew lease {} within {:?}, stepping down",
                self.identity(),
                self.config.lease_key(),
                self.config.renew_deadline()
            ),
            StepDown::LostTo(holder) => tracing::warn!(
                "Lease {} taken over by {}, stepping down",
                self.config.lease_key(),
                holder
            ),
            StepDown::WorkFinished => tracing::info!("Leader work returned, giving up leadership"),
        }

        work_token.cancel();
        self.is_leader.store(false, Ordering::SeqCst);
        self.set_phase(ElectorPhase::Acquiring);
        self.guard_callback("on_stop_leading", || self.config.callbacks().on_stop_leading());

        if reason != StepDown::WorkFinished {
            self.drain(work).await;
        }

        reason
    }

    /// Renew loop, spaced by the jittered retry period.
    ///
    /// The deadline counts from the start of the last successful attempt,
    /// beginning with the one that acquired the lease.
    async fn renew(
        &self,
        work: &mut JoinHandle<anyhow::Result<()>>,
        acquired_at: Instant,
    ) -> StepDown {
        let renew_deadline = self.config.renew_deadline();
        let mut deadline = acquired_at + renew_deadline;

        loop {
            let delay = jittered(self.config.retry_period(), JITTER_FACTOR);
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return StepDown::Stopped,
                result = &mut *work => {
                    log_work_result(result);
                    return StepDown::WorkFinished;
                }
                _ = tokio::time::sleep_until(deadline) => return StepDown::DeadlineExceeded,
                _ = tokio::time::sleep(delay) => {}
            }

            let attempted_at = Instant::now();
            if attempted_at >= deadline {
                return StepDown::DeadlineExceeded;
            }

            let remaining = deadline - attempted_at;
            let attempt = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return StepDown::Stopped,
                attempt = tokio::time::timeout(remaining, self.attempt()) => {
                    attempt.unwrap_or(Attempt::Failed)
                }
            };

            match attempt {
                Attempt::Acquired | Attempt::Renewed => deadline = attempted_at + renew_deadline,
                Attempt::HeldByOther(holder) => return StepDown::LostTo(holder),
                Attempt::Failed => {
                    if Instant::now() >= deadline {
                        return StepDown::DeadlineExceeded;
                    }
                }
            }
        }
    }

    /// Wait, bounded, for leader work to observe cancellation
    async fn drain(&self, mut work: JoinHandle<anyhow::Result<()>>) {
        let timeout = self.config.drain_timeout();
        match tokio::time::timeout(timeout, &mut work).await {
            Ok(result) => log_work_result(result),
            Err(_) => {
                tracing::warn!(
                    "Leader work did not stop within {:?}, abandoning it",
                    timeout
                );
                work.abort();
            }
        }
    }

    /// Try to acquire or renew the lease once.
    ///
    /// Returns `true` if this participant holds the lease afterwards. Store
    /// errors are logged at debug level and reported as `false`.
    pub async fn try_acquire_or_renew(&self) -> bool {
        self.attempt().await.succeeded()
    }

    async fn attempt(&self) -> Attempt {
        let store = self.config.store();
        let (namespace, name) = (self.config.namespace(), self.config.name());

        let existing = match store.get(namespace, name).await {
            Ok(lease) => lease,
            Err(e) if e.is_not_found() => return self.create_lease().await,
            Err(e) => {
                tracing::debug!("Failed to read lease {}: {}", self.config.lease_key(), e);
                return Attempt::Failed;
            }
        };

        self.observed_lease.store(Some(Arc::new(existing.clone())));
        let now = self.config.clock().now();

        if existing.is_held_by(self.identity()) {
            let mut renewed = existing;
            renewed.renew_time = Some(now);
            renewed.lease_duration_seconds = self.config.lease_duration_seconds();
            return self.write(renewed, Attempt::Renewed).await;
        }

        if let Some(holder) = existing.holder() {
            if !existing.is_expired(now) {
                let holder = holder.to_string();
                self.maybe_report_new_leader(&holder);
                return Attempt::HeldByOther(holder);
            }
            tracing::debug!(
                "Lease {} held by {} expired at {:?}",
                existing.key(),
                holder,
                existing.expires_at()
            );
        }

        let mut taken = existing;
        taken.holder_identity = Some(self.identity().to_string());
        taken.lease_duration_seconds = self.config.lease_duration_seconds();
        taken.acquire_time = Some(now);
        taken.renew_time = Some(now);
        taken.lease_transitions = taken.lease_transitions.saturating_add(1);
        self.write(taken, Attempt::Acquired).await
    }

    async fn create_lease(&self) -> Attempt {
        let now = self.config.clock().now();
        let lease = LeaseRecord {
            holder_identity: Some(self.identity().to_string()),
            lease_duration_seconds: self.config.lease_duration_seconds(),
            acquire_time: Some(now),
            renew_time: Some(now),
            lease_transitions: 0,
            ..LeaseRecord::new(self.config.namespace(), self.config.name())
        };

        match self.config.store().create(&lease).await {
            Ok(created) => {
                tracing::info!("Created lease {} held by {}", created.key(), self.identity());
                self.observe_own_write(created);
                Attempt::Acquired
            }
            Err(e) => {
                tracing::debug!("Failed to create lease {}: {}", lease.key(), e);
                Attempt::Failed
            }
        }
    }

    async fn write(&self, lease: LeaseRecord, success: Attempt) -> Attempt {
        match self.config.store().update(&lease).await {
            Ok(written) => {
                if success == Attempt::Acquired {
                    tracing::info!(
                        "{} acquired lease {} (transitions: {})",
                        self.identity(),
                        written.key(),
                        written.lease_transitions
                    );
                } else {
                    tracing::trace!("Renewed lease {}", written.key());
                }
                self.observe_own_write(written);
                success
            }
            Err(e) => {
                tracing::debug!("Failed to write lease {}: {}", lease.key(), e);
                Attempt::Failed
            }
        }
    }

    fn observe_own_write(&self, lease: LeaseRecord) {
        self.observed_lease.store(Some(Arc::new(lease)));
        let identity = self.identity().to_string();
        self.maybe_report_new_leader(&identity);
    }

    /// Fire `on_new_leader` when the observed holder changes
    fn maybe_report_new_leader(&self, identity: &str) {
        if identity.is_empty() {
            return;
        }
        let previous = self.observed_leader.load();
        if previous.as_deref().map(String::as_str) == Some(identity) {
            return;
        }

        self.observed_leader.store(Some(Arc::new(identity.to_string())));
        tracing::info!("New leader observed for {}: {}", self.config.lease_key(), identity);
        self.guard_callback("on_new_leader", || {
            self.config.callbacks().on_new_leader(identity)
        });
    }

    /// Best-effort write clearing the holder so others can take over at once
    async fn release(&self) {
        let Some(lease) = self.observed_lease.load_full() else {
            return;
        };
        if !lease.is_held_by(self.identity()) {
            tracing::debug!("Lease {} not held by us, nothing to release", lease.key());
            return;
        }

        let mut released = lease.as_ref().clone();
        released.holder_identity = None;
        released.lease_duration_seconds = 1;
        released.renew_time = Some(self.config.clock().now());

        let timeout = self.config.drain_timeout();
        match tokio::time::timeout(timeout, self.config.store().update(&released)).await {
            Ok(Ok(written)) => {
                tracing::info!("Released lease {}", written.key());
                self.observed_lease.store(Some(Arc::new(written)));
            }
            Ok(Err(e)) => tracing::warn!("Failed to release lease {}: {}", released.key(), e),
            Err(_) => tracing::warn!(
                "Timed out releasing lease {} after {:?}",
                released.key(),
                timeout
            ),
        }
    }

    fn guard_callback(&self, name: &str, callback: impl FnOnce()) {
        if catch_unwind(AssertUnwindSafe(callback)).is_err() {
            let err = Error::Callback(format!("{} panicked", name));
            tracing::error!("{} ({})", err, self.identity());
        }
    }
}

/// Turn the outcome of the leader-work task into a callback error, if any
fn work_error(result: std::result::Result<anyhow::Result<()>, JoinError>) -> Option<Error> {
    match result {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(Error::Callback(format!("on_start_leading failed: {:#}", e))),
        Err(e) if e.is_panic() => Some(Error::Callback("on_start_leading panicked".into())),
        Err(_) => None,
    }
}

fn log_work_result(result: std::result::Result<anyhow::Result<()>, JoinError>) {
    match work_error(result) {
        Some(err) => tracing::error!("{}", err),
        None => tracing::debug!("Leader work finished"),
    }
}
