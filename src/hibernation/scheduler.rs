//! Periodic idle sweep over the registry.
//!
//! Each tick snapshots the registry, resolves the policy of every
//! background view's app, and hibernates the ones idle longer than their
//! threshold. Hibernation is compare-and-swap against the snapshot's
//! activity counter, so a view shown or touched after the snapshot was
//! taken survives the sweep. The foreground view is never a candidate.
//!
//! Ticks run one after another on a single task and never overlap with
//! each other or with [`HibernationScheduler::sweep_now`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::HibernationPolicy;
use crate::lifecycle::LifecycleManager;
use crate::provider::ContextProvider;
use crate::view::Visibility;
use crate::view::registry::HibernateOutcome;

/// Default interval between sweeps.
pub const DEFAULT_TICK: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Base interval between sweeps.
    pub tick: Duration,
    /// Upper bound of a random delay added to every tick.
    pub jitter: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick: DEFAULT_TICK,
            jitter: Duration::ZERO,
        }
    }
}

impl SchedulerConfig {
    fn next_delay(&self) -> Duration {
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        if jitter_ms == 0 {
            return self.tick;
        }
        self.tick + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    }
}

/// What one sweep did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Background views considered.
    pub examined: usize,
    pub hibernated: usize,
    pub excluded: usize,
    /// Views whose app has hibernation disabled or unresolvable.
    pub disabled: usize,
    /// Candidates that became active, foreground or hibernated between
    /// the snapshot and the hibernation attempt.
    pub raced: usize,
}

/// Run one sweep against `manager`.
pub async fn sweep<P: ContextProvider>(manager: &LifecycleManager<P>) -> SweepReport {
    let store = manager.store();
    if let Err(e) = store.refresh() {
        tracing::warn!(error = %e, "config refresh failed; sweeping with cached policy");
    }
    let excluded = store.excluded_app_ids();
    let now = manager.now();
    let mut policies: HashMap<String, HibernationPolicy> = HashMap::new();
    let mut report = SweepReport::default();

    for view in manager.registry().snapshot() {
        if view.visibility != Visibility::Background {
            continue;
        }
        report.examined += 1;

        if excluded.contains(&view.key.app_id) {
            report.excluded += 1;
            continue;
        }
        let policy = *policies
            .entry(view.key.app_id.clone())
            .or_insert_with(|| manager.policy_for(&view.key.app_id));
        if !policy.enabled {
            report.disabled += 1;
            continue;
        }

        let idle = now.saturating_duration_since(view.last_active_at);
        if !policy.is_expired(idle) {
            continue;
        }

        match manager.hibernate_if_idle(&view.key, view.activity).await {
            HibernateOutcome::Hibernated => {
                report.hibernated += 1;
                tracing::info!(
                    view = %view.key,
                    idle_secs = idle.as_secs(),
                    threshold_secs = policy.idle_threshold.as_secs(),
                    "idle view hibernated"
                );
            }
            outcome => {
                report.raced += 1;
                tracing::debug!(view = %view.key, ?outcome, "hibernation candidate changed during sweep");
            }
        }
    }

    report
}

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns the background sweep task.
pub struct HibernationScheduler<P: ContextProvider> {
    manager: Arc<LifecycleManager<P>>,
    config: SchedulerConfig,
    running: Mutex<Option<Running>>,
    sweeping: Arc<tokio::sync::Mutex<()>>,
}

impl<P: ContextProvider> HibernationScheduler<P> {
    pub fn new(manager: Arc<LifecycleManager<P>>, config: SchedulerConfig) -> Self {
        Self {
            manager,
            config,
            running: Mutex::new(None),
            sweeping: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    /// Start the sweep loop. Returns `false` if it was already running.
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            return false;
        }

        let cancel = CancellationToken::new();
        let manager = self.manager.clone();
        let config = self.config.clone();
        let sweeping = self.sweeping.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            tracing::info!(tick_secs = config.tick.as_secs(), "hibernation scheduler started");
            loop {
                let delay = config.next_delay();
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
                let _guard = sweeping.lock().await;
                let report = sweep(&manager).await;
                tracing::debug!(?report, "hibernation sweep finished");
            }
            tracing::info!("hibernation scheduler stopped");
        });

        *running = Some(Running { cancel, task });
        true
    }

    /// Stop the sweep loop and wait for it to exit. A sweep in progress
    /// finishes first. Returns `false` if it was not running.
    pub async fn stop(&self) -> bool {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(Running { cancel, task }) = running else {
            return false;
        };
        cancel.cancel();
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "hibernation scheduler task ended abnormally");
        }
        true
    }

    /// Run a sweep right now, serialized with the background loop.
    pub async fn sweep_now(&self) -> SweepReport {
        let _guard = self.sweeping.lock().await;
        sweep(&self.manager).await
    }
}
