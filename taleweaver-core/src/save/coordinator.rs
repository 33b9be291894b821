//! Single-flight save coordination.
//!
//! At most one capture-and-persist cycle runs at a time. Triggers that
//! arrive while a cycle is capturing are absorbed into it. Non-periodic
//! triggers that arrive while it is persisting schedule exactly one
//! follow-up cycle, so state changed after the capture is not lost.
//! Periodic triggers never schedule a follow-up.

use super::snapshot::{PersistenceSink, SaveError, SnapshotProvider};
use super::status::{SaveFailure, SaveState, SaveStatus, SaveTrigger};
use crate::classify::{classify_error, error_chain_message};
use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Default autosave interval.
pub const DEFAULT_AUTOSAVE_INTERVAL: Duration = Duration::from_secs(30);

/// Autosave settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveConfig {
    /// Period of the autosave timer. Zero disables periodic autosave.
    pub interval: Duration,

    /// Whether periodic autosave starts enabled.
    pub enabled: bool,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_AUTOSAVE_INTERVAL,
            enabled: true,
        }
    }
}

impl SaveConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Whether the owning session is in an active lifecycle state.
///
/// Shared between the session and the coordinator; re-enabling autosave
/// only re-arms the timer while the flag is set.
#[derive(Debug, Clone)]
pub struct ActivityFlag(Arc<AtomicBool>);

impl ActivityFlag {
    pub fn new(active: bool) -> Self {
        Self(Arc::new(AtomicBool::new(active)))
    }

    pub fn set_active(&self, active: bool) {
        self.0.store(active, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for ActivityFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Result of [`SaveCoordinator::trigger_save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A cycle ran (plus any follow-up); status after it finished.
    Completed(SaveStatus),

    /// Absorbed by the cycle already in flight.
    Coalesced { into: SaveTrigger },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Capturing,
    Persisting,
}

struct CycleState {
    /// Phase of the cycle in flight, if any.
    in_flight: Option<Phase>,
    followup: Option<SaveTrigger>,
    enabled: bool,
    timer: Option<JoinHandle<()>>,
}

struct Inner<S> {
    provider: Arc<dyn SnapshotProvider<S>>,
    sink: Arc<dyn PersistenceSink<S>>,
    interval: Duration,
    activity: ActivityFlag,
    cycle: Mutex<CycleState>,
    status: watch::Sender<SaveStatus>,
}

impl<S> Inner<S> {
    fn lock(&self) -> MutexGuard<'_, CycleState> {
        // The state is plain data updated in single assignments.
        self.cycle.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<S> Drop for Inner<S> {
    fn drop(&mut self) {
        let cycle = self.cycle.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(timer) = cycle.timer.take() {
            timer.abort();
        }
    }
}

/// Serializes saves of a snapshot type `S`.
///
/// Cheap to clone; clones share the same state. The periodic timer needs a
/// Tokio runtime, so [`start`](Self::start) must be called from within one.
pub struct SaveCoordinator<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for SaveCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Send + Sync + 'static> SaveCoordinator<S> {
    pub fn new(
        provider: impl SnapshotProvider<S> + 'static,
        sink: impl PersistenceSink<S> + 'static,
    ) -> Self {
        Self::with_config(
            Arc::new(provider),
            Arc::new(sink),
            SaveConfig::default(),
            ActivityFlag::default(),
        )
    }

    pub fn with_config(
        provider: Arc<dyn SnapshotProvider<S>>,
        sink: Arc<dyn PersistenceSink<S>>,
        config: SaveConfig,
        activity: ActivityFlag,
    ) -> Self {
        let (status, _) = watch::channel(SaveStatus::default());
        Self {
            inner: Arc::new(Inner {
                provider,
                sink,
                interval: config.interval,
                activity,
                cycle: Mutex::new(CycleState {
                    in_flight: None,
                    followup: None,
                    enabled: config.enabled && !config.interval.is_zero(),
                    timer: None,
                }),
                status,
            }),
        }
    }

    /// Arm the periodic timer if autosave is enabled. Idempotent.
    pub fn start(&self) {
        let mut cycle = self.inner.lock();
        if cycle.enabled {
            self.arm(&mut cycle);
        }
    }

    /// Disarm the periodic timer. A cycle in flight runs to completion.
    pub fn stop(&self) {
        let mut cycle = self.inner.lock();
        if let Some(timer) = cycle.timer.take() {
            timer.abort();
            debug!("autosave timer stopped");
        }
    }

    /// Enable or disable periodic autosave.
    ///
    /// Disabling stops the timer; counters and timestamps are kept.
    /// Enabling re-arms it only while the session is active.
    pub fn set_enabled(&self, enabled: bool) {
        let mut cycle = self.inner.lock();
        cycle.enabled = enabled;
        if !enabled {
            if let Some(timer) = cycle.timer.take() {
                timer.abort();
            }
        } else if self.inner.activity.is_active() {
            self.arm(&mut cycle);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.lock().enabled
    }

    /// Whether the periodic timer is armed.
    pub fn is_running(&self) -> bool {
        self.inner.lock().timer.is_some()
    }

    pub fn activity(&self) -> &ActivityFlag {
        &self.inner.activity
    }

    /// Request a save and wait for it.
    ///
    /// Failures never propagate; they show up in the returned status.
    /// The cycle runs on its own task, so dropping the returned future
    /// (a timeout, a `select!`) leaves it running to completion.
    pub async fn trigger_save(&self, reason: SaveTrigger) -> TriggerOutcome {
        if let Some(into) = self.claim(reason) {
            return TriggerOutcome::Coalesced { into };
        }
        let status = match self.run_claimed(reason).await {
            Ok(status) => status,
            Err(err) => {
                warn!(%reason, error = %err, "save task ended early");
                self.status()
            }
        };
        TriggerOutcome::Completed(status)
    }

    /// Request a save without waiting for it.
    ///
    /// The cycle is claimed before returning, so [`wait_idle`](Self::wait_idle)
    /// observes it. Returns `None` when the request was coalesced.
    pub fn spawn_save(&self, reason: SaveTrigger) -> Option<JoinHandle<SaveStatus>> {
        if self.claim(reason).is_some() {
            return None;
        }
        Some(self.run_claimed(reason))
    }

    fn run_claimed(&self, reason: SaveTrigger) -> JoinHandle<SaveStatus> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            coordinator.run(reason).await;
            coordinator.status()
        })
    }

    /// Retry after a failed save.
    pub async fn retry(&self) -> Result<TriggerOutcome, SaveError> {
        if !self.status().is_error() {
            return Err(SaveError::NotInErrorState);
        }
        Ok(self.trigger_save(SaveTrigger::Manual).await)
    }

    pub fn status(&self) -> SaveStatus {
        self.inner.status.borrow().clone()
    }

    /// Watch status changes.
    pub fn subscribe(&self) -> watch::Receiver<SaveStatus> {
        self.inner.status.subscribe()
    }

    /// Wait until no cycle is in flight.
    pub async fn wait_idle(&self) -> SaveStatus {
        let mut rx = self.subscribe();
        // The sender lives in `inner`, which `self` keeps alive.
        let _ = rx.wait_for(|s| !s.is_saving()).await;
        self.status()
    }

    fn arm(&self, cycle: &mut CycleState) {
        if cycle.timer.is_some() {
            return;
        }
        if self.inner.interval.is_zero() {
            warn!("autosave interval is zero, periodic autosave stays off");
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.interval;
        cycle.timer = Some(tokio::spawn(tick(weak, period)));
        debug!(interval_secs = period.as_secs_f64(), "autosave timer armed");
    }

    /// Mark a cycle in flight, or record the trigger against the current one.
    /// Returns the trigger absorbing `reason` when coalesced.
    fn claim(&self, reason: SaveTrigger) -> Option<SaveTrigger> {
        let mut cycle = self.inner.lock();
        match cycle.in_flight {
            Some(phase) => {
                if phase == Phase::Persisting && reason != SaveTrigger::Periodic {
                    cycle.followup.get_or_insert(reason);
                }
                let mut into = reason;
                self.inner.status.send_modify(|status| {
                    status.coalesced.push(reason);
                    into = status.current_trigger.unwrap_or(reason);
                });
                debug!(%reason, %into, "save coalesced");
                Some(into)
            }
            None => {
                cycle.in_flight = Some(Phase::Capturing);
                self.inner.status.send_modify(|status| begin(status, reason));
                None
            }
        }
    }

    /// Run the claimed cycle and any follow-ups, then release the claim.
    async fn run(&self, mut reason: SaveTrigger) {
        loop {
            let result = AssertUnwindSafe(self.capture_and_persist(reason))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(SaveError::Capture("save cycle panicked".into())));

            // Published under the cycle lock so a new claim never sees a
            // stale `Saving` state.
            let next = {
                let mut cycle = self.inner.lock();
                let next = cycle.followup.take();
                cycle.in_flight = next.map(|_| Phase::Capturing);
                self.inner.status.send_modify(|status| {
                    finish(status, reason, result);
                    if let Some(next) = next {
                        begin(status, next);
                    }
                });
                next
            };

            match next {
                Some(next) => {
                    debug!(%next, "running follow-up save");
                    reason = next;
                }
                None => return,
            }
        }
    }

    async fn capture_and_persist(&self, reason: SaveTrigger) -> Result<(), SaveError> {
        let snapshot = self.inner.provider.capture().await?;
        self.inner.lock().in_flight = Some(Phase::Persisting);
        self.inner.sink.persist(&snapshot, reason).await
    }
}

fn begin(status: &mut SaveStatus, reason: SaveTrigger) {
    status.state = SaveState::Saving;
    status.current_trigger = Some(reason);
    status.coalesced.clear();
    status.error = None;
}

fn finish(status: &mut SaveStatus, reason: SaveTrigger, result: Result<(), SaveError>) {
    match result {
        Ok(()) => {
            status.state = SaveState::Saved;
            status.last_save_time = Some(Utc::now());
            status.total_saves += 1;
            status.error = None;
            info!(%reason, total_saves = status.total_saves, "game saved");
        }
        Err(err) => {
            let classification = classify_error(&err);
            let message = error_chain_message(&err);
            warn!(
                %reason,
                error_kind = %classification.kind,
                error = %message,
                "save failed"
            );
            status.state = SaveState::Error;
            status.error = Some(SaveFailure {
                message,
                kind: classification.kind,
                retryable: classification.retryable,
            });
        }
    }
}

/// Periodic timer. Holds only a weak reference so dropping the last
/// coordinator handle ends it.
async fn tick<S: Send + Sync + 'static>(inner: Weak<Inner<S>>, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        SaveCoordinator { inner }.spawn_save(SaveTrigger::Periodic);
    }
}
