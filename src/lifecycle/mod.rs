//! Lifecycle facade: the surface host code (IPC handlers, the daemon)
//! calls to show, hide, navigate, hibernate, resume and destroy views.
//!
//! Composes the registry, the visibility controller, the config store,
//! the hibernation ledger and the metrics collector. Provider failures
//! come back as [`LifecycleError`]; release and persistence failures are
//! logged and never reach the caller.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures::future::join_all;

use crate::clock::Clock;
use crate::hibernation::{HibernationPolicy, resolve_policy};
use crate::metrics::{MetricsCollector, MetricsSample};
use crate::provider::{BrowsingContext, ContextProvider, ContextSpec, ProviderError};
use crate::store::{ConfigStore, HibernatedView, HibernationLedger};
use crate::view::registry::{HibernateOutcome, Materialized, Retained, ViewRegistry, release_logged};
use crate::view::visibility::{ShowOutcome, VisibilityController};
use crate::view::{Bounds, ViewKey, ViewSnapshot, Visibility, partition};

/// Global default idle threshold when nothing else sets one.
pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(15 * 60);

/// Lifecycle error surfaced to callers.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// The browsing-context provider could not build the view.
    #[error("failed to create view {key}: {source}")]
    ResourceCreation {
        key: ViewKey,
        #[source]
        source: ProviderError,
    },
    /// A live view rejected a navigate or reload.
    #[error("view {key} failed to {action}: {source}")]
    Operation {
        key: ViewKey,
        action: &'static str,
        #[source]
        source: ProviderError,
    },
    /// The operation needs an existing view and there is none.
    #[error("no view {key}")]
    NotFound { key: ViewKey },
    /// The app is not in the configuration store.
    #[error("unknown app {app_id}")]
    UnknownApp { app_id: String },
}

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Idle threshold used when neither app, workspace nor store sets one.
    pub default_idle_threshold: Duration,
    /// How many times `show` re-materializes a view that got hibernated
    /// between creation and promotion.
    pub show_retry_limit: u8,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            default_idle_threshold: DEFAULT_IDLE_THRESHOLD,
            show_retry_limit: 3,
        }
    }
}

pub struct LifecycleManager<P: ContextProvider> {
    provider: Arc<P>,
    store: Arc<dyn ConfigStore>,
    ledger: Arc<dyn HibernationLedger>,
    registry: Arc<ViewRegistry<P::Context>>,
    visibility: VisibilityController<P::Context>,
    metrics: MetricsCollector,
    config: ManagerConfig,
}

impl<P: ContextProvider> LifecycleManager<P> {
    pub fn new(
        provider: Arc<P>,
        store: Arc<dyn ConfigStore>,
        ledger: Arc<dyn HibernationLedger>,
        clock: Arc<dyn Clock>,
        config: ManagerConfig,
    ) -> Self {
        let registry = Arc::new(ViewRegistry::new(clock));
        Self {
            provider,
            store,
            ledger,
            visibility: VisibilityController::new(registry.clone()),
            registry,
            metrics: MetricsCollector::new(),
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    pub(crate) fn registry(&self) -> &ViewRegistry<P::Context> {
        &self.registry
    }

    pub(crate) fn now(&self) -> Instant {
        self.registry.now()
    }

    /// Effective hibernation policy for `app_id`.
    pub fn policy_for(&self, app_id: &str) -> HibernationPolicy {
        resolve_policy(self.store.as_ref(), app_id, self.config.default_idle_threshold)
    }

    /// Build the context for `key`, in its retained partition if it was
    /// hibernated, else in the partition its app's sharing mode implies.
    async fn materialize(
        &self,
        key: &ViewKey,
        retained: Option<Retained>,
    ) -> Result<Materialized<P::Context>, LifecycleError> {
        let (partition, url) = match retained {
            Some(retained) => (retained.partition, retained.url),
            None => {
                let app = self.store.app(&key.app_id).ok_or_else(|| LifecycleError::UnknownApp {
                    app_id: key.app_id.clone(),
                })?;
                let partition =
                    partition::resolve(&key.app_id, &key.instance_id, &app.workspace_id, app.sharing_mode);
                (partition, app.url)
            }
        };

        let spec = ContextSpec {
            key: key.clone(),
            partition: partition.clone(),
            url: url.clone(),
        };
        let context = self.provider.create(spec).await.map_err(|source| {
            tracing::warn!(view = %key, error = %source, "context creation failed");
            LifecycleError::ResourceCreation {
                key: key.clone(),
                source,
            }
        })?;

        tracing::info!(view = %key, partition = %partition, "context created");
        Ok(Materialized { context, partition, url })
    }

    /// Make sure `key` has a live context. Clears the persisted
    /// hibernation flag when a hibernated entry was rebuilt.
    async fn ensure_live(&self, key: &ViewKey) -> Result<ViewSnapshot, LifecycleError> {
        let resumed = AtomicBool::new(false);
        let snapshot = self
            .registry
            .get_or_create(key, |retained| {
                resumed.store(retained.is_some(), Ordering::Relaxed);
                self.materialize(key, retained)
            })
            .await?;

        if resumed.load(Ordering::Relaxed) {
            tracing::info!(view = %key, "view resumed");
            self.record_cleared(key).await;
        }
        Ok(snapshot)
    }

    /// Persist the identity of `key` if it is still hibernated.
    async fn record_hibernated(&self, key: &ViewKey) {
        let Some(snapshot) = self.registry.get(key) else {
            return;
        };
        if snapshot.visibility != Visibility::Hibernated {
            return;
        }
        let view = HibernatedView {
            key: snapshot.key,
            partition: snapshot.partition,
            url: snapshot.url,
        };
        if let Err(e) = self.ledger.mark_hibernated(view).await {
            tracing::warn!(view = %key, error = %e, "failed to persist hibernated view");
        }
    }

    async fn record_cleared(&self, key: &ViewKey) {
        if let Err(e) = self.ledger.clear_hibernated(key.clone()).await {
            tracing::warn!(view = %key, error = %e, "failed to clear hibernated view");
        }
    }

    /// Bring `key` to the foreground, creating or resuming it as needed.
    pub async fn show(&self, key: &ViewKey, bounds: Option<Bounds>) -> Result<(), LifecycleError> {
        for _ in 0..=self.config.show_retry_limit {
            self.ensure_live(key).await?;
            match self.visibility.show(key, bounds) {
                ShowOutcome::Shown | ShowOutcome::AlreadyForeground => return Ok(()),
                // Hibernated or destroyed between materialization and
                // promotion.
                ShowOutcome::NotLive => {
                    tracing::debug!(view = %key, "view went away before promotion; retrying");
                }
            }
        }
        Err(LifecycleError::NotFound { key: key.clone() })
    }

    /// Move `key` to the background if it is in the foreground.
    pub fn hide(&self, key: &ViewKey) {
        self.visibility.hide(key);
    }

    pub fn hide_all(&self) {
        self.visibility.hide_all();
    }

    pub fn foreground(&self) -> Option<ViewKey> {
        self.visibility.foreground()
    }

    /// Hibernate `key`. A foreground view is hidden first. Unknown or
    /// already hibernated views are left alone.
    pub async fn hibernate(&self, key: &ViewKey) {
        self.visibility.hide(key);
        match self.registry.hibernate(key, None).await {
            HibernateOutcome::Hibernated => {
                tracing::info!(view = %key, "view hibernated");
                self.record_hibernated(key).await;
            }
            outcome => {
                tracing::debug!(view = %key, ?outcome, "hibernate request ignored");
            }
        }
    }

    /// Hibernate `key` only if its activity counter is still `seen`.
    pub(crate) async fn hibernate_if_idle(&self, key: &ViewKey, seen: u64) -> HibernateOutcome {
        let outcome = self.registry.hibernate(key, Some(seen)).await;
        if outcome == HibernateOutcome::Hibernated {
            self.record_hibernated(key).await;
        }
        outcome
    }

    /// Rebuild a hibernated view in the background (or create it if the
    /// app has no view yet).
    pub async fn resume(&self, key: &ViewKey) -> Result<(), LifecycleError> {
        self.ensure_live(key).await.map(|_| ())
    }

    /// Load `url` in an existing view, resuming it first if hibernated.
    pub async fn navigate(&self, key: &ViewKey, url: &str) -> Result<(), LifecycleError> {
        self.drive(key, "navigate", |context| context.navigate(url), Some(url))
            .await?;
        tracing::debug!(view = %key, url, "navigated");
        Ok(())
    }

    /// Reload the current page of an existing view.
    pub async fn reload(&self, key: &ViewKey) -> Result<(), LifecycleError> {
        self.drive(key, "reload", |context| context.reload(), None).await
    }

    async fn drive(
        &self,
        key: &ViewKey,
        action: &'static str,
        op: impl FnOnce(&mut P::Context) -> Result<(), ProviderError>,
        new_url: Option<&str>,
    ) -> Result<(), LifecycleError> {
        if self.registry.get(key).is_none() {
            return Err(LifecycleError::NotFound { key: key.clone() });
        }
        self.ensure_live(key).await?;

        let now = self.now();
        let result = self.registry.with_live(key, |entry| -> Result<(), ProviderError> {
            let context = entry.context_mut().ok_or(ProviderError::Gone)?;
            op(context)?;
            if let Some(url) = new_url {
                entry.url = url.to_string();
            }
            entry.mark_active(now);
            Ok(())
        });
        match result {
            Some(Ok(())) => Ok(()),
            Some(Err(source)) => {
                tracing::warn!(view = %key, action, error = %source, "view operation failed");
                Err(LifecycleError::Operation {
                    key: key.clone(),
                    action,
                    source,
                })
            }
            None => Err(LifecycleError::NotFound { key: key.clone() }),
        }
    }

    /// Remove `key` entirely, releasing its context. Unknown keys are a
    /// no-op.
    pub async fn destroy(&self, key: &ViewKey) {
        if self.registry.remove(key).await {
            tracing::info!(view = %key, "view destroyed");
            self.record_cleared(key).await;
        }
    }

    /// Record user activity on `key`.
    pub fn touch(&self, key: &ViewKey) -> bool {
        self.registry.touch(key)
    }

    pub fn get(&self, key: &ViewKey) -> Option<ViewSnapshot> {
        self.registry.get(key)
    }

    /// Number of views currently holding a live context.
    pub fn live_count(&self) -> usize {
        self.registry.lock().entries.values().filter(|e| e.is_live()).count()
    }

    /// Every known view, ordered by key.
    pub fn get_all(&self) -> Vec<ViewSnapshot> {
        self.registry.snapshot()
    }

    /// Memory and CPU of the process hosting `key`. Zeroed when the view
    /// is unknown, hibernated or its process cannot be inspected.
    pub fn metrics(&self, key: &ViewKey) -> MetricsSample {
        self.metrics.sample(&self.registry, key)
    }

    /// Seed hibernated entries from the ledger, each in the partition and
    /// at the URL it was hibernated with. Views whose app is gone from the
    /// store are dropped from the ledger. Returns how many entries were
    /// seeded.
    pub async fn restore(&self) -> usize {
        let views = match self.ledger.load_hibernated().await {
            Ok(views) => views,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load hibernation ledger; starting empty");
                return 0;
            }
        };

        let mut seeded = 0;
        for view in views {
            if self.store.app(&view.key.app_id).is_none() {
                tracing::info!(view = %view.key, "dropping hibernated view of removed app");
                self.record_cleared(&view.key).await;
                continue;
            }
            if self.registry.insert_hibernated(view.key, view.partition, view.url) {
                seeded += 1;
            }
        }
        tracing::info!(seeded, "restored hibernated views");
        seeded
    }

    /// Release every live context and clear the registry. The ledger is
    /// left untouched so hibernated views come back hibernated.
    pub async fn shutdown(&self) {
        let live = self.registry.drain();
        let count = live.len();
        join_all(
            live.into_iter()
                .map(|(key, context)| async move { release_logged(&key, context).await }),
        )
        .await;
        tracing::info!(released = count, "lifecycle manager shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AppRecord, SharingMode};
    use crate::testing::fixture;

    fn key(app: &str, instance: &str) -> ViewKey {
        ViewKey::new(app, instance)
    }

    #[tokio::test]
    async fn show_creates_lazily_and_foregrounds() {
        let fx = fixture();
        let k = key("mail", "1");
        assert!(fx.manager.get(&k).is_none());

        fx.manager.show(&k, None).await.unwrap();

        let snap = fx.manager.get(&k).unwrap();
        assert_eq!(snap.visibility, Visibility::Foreground);
        assert_eq!(snap.url, "https://mail.test/");
        assert_eq!(fx.provider.creates(), 1);
    }

    #[tokio::test]
    async fn show_unknown_app_is_typed_error() {
        let fx = fixture();
        let err = fx.manager.show(&key("ghost", "1"), None).await.unwrap_err();
        assert!(matches!(err, LifecycleError::UnknownApp { ref app_id } if app_id == "ghost"));
        assert!(fx.manager.get_all().is_empty());
    }

    #[tokio::test]
    async fn show_factory_failure_is_resource_creation_error() {
        let fx = fixture();
        fx.provider.fail_create(true);

        let err = fx.manager.show(&key("mail", "1"), None).await.unwrap_err();

        assert!(matches!(err, LifecycleError::ResourceCreation { .. }));
        assert!(fx.manager.get_all().is_empty());
    }

    #[tokio::test]
    async fn shared_instances_share_partition_but_not_context() {
        let fx = fixture();
        fx.manager.show(&key("mail", "1"), None).await.unwrap();
        fx.manager.show(&key("mail", "2"), None).await.unwrap();

        let a = fx.manager.get(&key("mail", "1")).unwrap();
        let b = fx.manager.get(&key("mail", "2")).unwrap();
        assert_eq!(a.partition, b.partition);
        assert_eq!(fx.provider.creates(), 2);
        assert_eq!(fx.manager.live_count(), 2);
    }

    #[tokio::test]
    async fn isolated_instances_get_distinct_partitions() {
        let fx = fixture();
        fx.manager.resume(&key("chat", "1")).await.unwrap();
        fx.manager.resume(&key("chat", "2")).await.unwrap();

        let a = fx.manager.get(&key("chat", "1")).unwrap();
        let b = fx.manager.get(&key("chat", "2")).unwrap();
        assert_ne!(a.partition, b.partition);
    }

    #[tokio::test]
    async fn only_one_view_is_ever_foreground() {
        let fx = fixture();
        for k in [key("mail", "1"), key("chat", "1"), key("mail", "2")] {
            fx.manager.show(&k, None).await.unwrap();
            let fg = fx
                .manager
                .get_all()
                .iter()
                .filter(|s| s.visibility == Visibility::Foreground)
                .count();
            assert_eq!(fg, 1);
        }
        assert_eq!(fx.manager.foreground(), Some(key("mail", "2")));
    }

    #[tokio::test]
    async fn hibernate_then_resume_keeps_partition_and_revives_context() {
        let fx = fixture();
        let k = key("chat", "1");
        fx.manager.resume(&k).await.unwrap();
        let before = fx.manager.get(&k).unwrap();

        fx.manager.hibernate(&k).await;
        let hibernated = fx.manager.get(&k).unwrap();
        assert_eq!(hibernated.visibility, Visibility::Hibernated);
        assert_eq!(fx.store.hibernated(), vec![k.clone()]);
        assert_eq!(fx.manager.live_count(), 0);

        fx.manager.resume(&k).await.unwrap();
        let after = fx.manager.get(&k).unwrap();
        assert_eq!(after.partition, before.partition);
        assert_eq!(after.visibility, Visibility::Background);
        assert!(fx.store.hibernated().is_empty());
        assert_eq!(fx.manager.live_count(), 1);
    }

    #[tokio::test]
    async fn hibernate_foreground_hides_it_first() {
        let fx = fixture();
        let k = key("mail", "1");
        fx.manager.show(&k, None).await.unwrap();

        fx.manager.hibernate(&k).await;

        assert_eq!(fx.manager.foreground(), None);
        assert_eq!(fx.manager.get(&k).unwrap().visibility, Visibility::Hibernated);
        let events = fx.provider.events();
        let detach = events.iter().position(|e| e == "detach mail/1").unwrap();
        let release = events.iter().position(|e| e == "release mail/1").unwrap();
        assert!(detach < release);
    }

    #[tokio::test]
    async fn hibernate_is_idempotent_and_ignores_unknown() {
        let fx = fixture();
        let k = key("mail", "1");
        fx.manager.resume(&k).await.unwrap();

        fx.manager.hibernate(&k).await;
        fx.manager.hibernate(&k).await;
        fx.manager.hibernate(&key("ghost", "1")).await;

        assert_eq!(fx.provider.releases(), 1);
        assert_eq!(fx.store.hibernated(), vec![k]);
    }

    #[tokio::test]
    async fn show_resumes_hibernated_view() {
        let fx = fixture();
        let k = key("mail", "1");
        fx.manager.show(&k, None).await.unwrap();
        fx.manager.hibernate(&k).await;

        fx.manager.show(&k, None).await.unwrap();

        assert_eq!(fx.manager.get(&k).unwrap().visibility, Visibility::Foreground);
        assert_eq!(fx.provider.creates(), 2);
        assert!(fx.store.hibernated().is_empty());
    }

    #[tokio::test]
    async fn navigate_unknown_is_not_found() {
        let fx = fixture();
        let err = fx.manager.navigate(&key("mail", "1"), "https://x.test/").await.unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound { .. }));
        let err = fx.manager.reload(&key("mail", "1")).await.unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound { .. }));
    }

    #[tokio::test]
    async fn navigate_updates_url_and_activity() {
        let fx = fixture();
        let k = key("mail", "1");
        fx.manager.resume(&k).await.unwrap();
        let before = fx.manager.get(&k).unwrap().last_active_at;

        fx.clock.advance(Duration::from_secs(60));
        fx.manager.navigate(&k, "https://mail.test/inbox").await.unwrap();

        let snap = fx.manager.get(&k).unwrap();
        assert_eq!(snap.url, "https://mail.test/inbox");
        assert_eq!(snap.last_active_at - before, Duration::from_secs(60));
        assert!(fx.provider.events().contains(&"navigate mail/1 https://mail.test/inbox".to_string()));
    }

    #[tokio::test]
    async fn navigate_hibernated_resumes_and_reopens_last_url() {
        let fx = fixture();
        let k = key("mail", "1");
        fx.manager.resume(&k).await.unwrap();
        fx.manager.navigate(&k, "https://mail.test/sent").await.unwrap();
        fx.manager.hibernate(&k).await;

        fx.manager.reload(&k).await.unwrap();

        assert_eq!(fx.manager.get(&k).unwrap().visibility, Visibility::Background);
        let events = fx.provider.events();
        assert_eq!(events.iter().filter(|e| e.starts_with("create mail/1")).count(), 2);
        assert!(events.contains(&"reload mail/1".to_string()));
        assert_eq!(fx.manager.get(&k).unwrap().url, "https://mail.test/sent");
    }

    #[tokio::test]
    async fn destroy_removes_and_clears_ledger() {
        let fx = fixture();
        let k = key("mail", "1");
        fx.manager.show(&k, None).await.unwrap();
        fx.manager.hibernate(&k).await;

        fx.manager.destroy(&k).await;
        fx.manager.destroy(&k).await;
        fx.manager.destroy(&key("ghost", "1")).await;

        assert!(fx.manager.get(&k).is_none());
        assert!(fx.store.hibernated().is_empty());
        assert_eq!(fx.provider.releases(), 1);
    }

    #[tokio::test]
    async fn destroy_foreground_clears_foreground() {
        let fx = fixture();
        let k = key("mail", "1");
        fx.manager.show(&k, None).await.unwrap();

        fx.manager.destroy(&k).await;

        assert_eq!(fx.manager.foreground(), None);
        assert_eq!(fx.provider.releases(), 1);
    }

    #[tokio::test]
    async fn hide_and_hide_all() {
        let fx = fixture();
        let k = key("mail", "1");
        fx.manager.show(&k, None).await.unwrap();

        fx.manager.hide(&key("chat", "1"));
        assert_eq!(fx.manager.foreground(), Some(k.clone()));

        fx.manager.hide_all();
        assert_eq!(fx.manager.foreground(), None);
        assert_eq!(fx.manager.get(&k).unwrap().visibility, Visibility::Background);
    }

    fn hibernated(app: &str, instance: &str, partition: &str, url: &str) -> HibernatedView {
        HibernatedView {
            key: key(app, instance),
            partition: partition.into(),
            url: url.into(),
        }
    }

    #[tokio::test]
    async fn restore_seeds_hibernated_entries_and_prunes_removed_apps() {
        let fx = fixture();
        fx.store
            .mark_hibernated(hibernated("mail", "1", "persist:p", "https://mail.test/"))
            .await
            .unwrap();
        fx.store
            .mark_hibernated(hibernated("gone", "1", "persist:q", "https://gone.test/"))
            .await
            .unwrap();

        assert_eq!(fx.manager.restore().await, 1);

        let snap = fx.manager.get(&key("mail", "1")).unwrap();
        assert_eq!(snap.visibility, Visibility::Hibernated);
        assert!(fx.manager.get(&key("gone", "1")).is_none());
        assert_eq!(fx.store.hibernated(), vec![key("mail", "1")]);
        assert_eq!(fx.provider.creates(), 0);
    }

    #[tokio::test]
    async fn restored_entry_resumes_in_persisted_partition_and_url() {
        let fx = fixture();
        let k = key("mail", "1");
        fx.store
            .mark_hibernated(hibernated("mail", "1", "persist:kept", "https://mail.test/thread/9"))
            .await
            .unwrap();
        fx.manager.restore().await;

        fx.manager.show(&k, None).await.unwrap();

        let snap = fx.manager.get(&k).unwrap();
        assert_eq!(snap.partition, "persist:kept");
        assert_eq!(snap.url, "https://mail.test/thread/9");
        assert!(fx.store.hibernated().is_empty());
    }

    #[tokio::test]
    async fn sharing_mode_change_across_restart_keeps_partition_and_url() {
        let fx = fixture();
        let k = key("mail", "1");
        fx.manager.show(&k, None).await.unwrap();
        fx.manager.navigate(&k, "https://mail.test/drafts").await.unwrap();
        let shared = partition::resolve("mail", "1", "work", SharingMode::Shared);
        assert_eq!(fx.manager.get(&k).unwrap().partition, shared);
        fx.manager.hibernate(&k).await;
        fx.manager.shutdown().await;

        fx.store.put_app(AppRecord {
            id: "mail".into(),
            workspace_id: "work".into(),
            url: "https://mail.test/".into(),
            sharing_mode: SharingMode::Isolated,
            idle_override: None,
        });
        assert_eq!(fx.manager.restore().await, 1);
        fx.manager.show(&k, None).await.unwrap();

        let snap = fx.manager.get(&k).unwrap();
        assert_eq!(snap.partition, shared);
        assert_eq!(snap.url, "https://mail.test/drafts");
    }

    #[tokio::test]
    async fn dead_context_is_rebuilt_on_show() {
        let fx = fixture();
        let k = key("mail", "1");
        fx.manager.show(&k, None).await.unwrap();
        let before = fx.manager.get(&k).unwrap();
        fx.manager.registry().with_live(&k, |entry| {
            if let Some(context) = entry.context_mut() {
                context.alive = false;
            }
        });

        fx.manager.show(&k, None).await.unwrap();

        let after = fx.manager.get(&k).unwrap();
        assert_eq!(after.visibility, Visibility::Foreground);
        assert_eq!(after.partition, before.partition);
        assert_eq!(fx.provider.creates(), 2);
        assert_eq!(fx.provider.releases(), 1);
        let context = fx
            .manager
            .registry()
            .with_live(&k, |entry| entry.context_mut().map(|c| (c.alive, c.attached)));
        assert_eq!(context, Some(Some((true, true))));
    }

    #[tokio::test]
    async fn navigate_failure_is_operation_error() {
        let fx = fixture();
        let k = key("mail", "1");
        fx.manager.resume(&k).await.unwrap();
        fx.provider.fail_drive(true);

        let err = fx.manager.navigate(&k, "https://mail.test/x").await.unwrap_err();
        assert!(matches!(err, LifecycleError::Operation { action: "navigate", .. }));
        assert!(err.to_string().starts_with("view mail/1 failed to navigate"));
        let err = fx.manager.reload(&k).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Operation { action: "reload", .. }));

        assert_eq!(fx.manager.get(&k).unwrap().url, "https://mail.test/");
    }

    #[tokio::test]
    async fn destroy_unknown_does_not_touch_ledger() {
        let fx = fixture();
        let writes = fx.store.ledger_writes();

        fx.manager.destroy(&key("ghost", "1")).await;
        fx.manager.destroy(&key("mail", "1")).await;

        assert_eq!(fx.store.ledger_writes(), writes);
    }

    #[tokio::test]
    async fn shutdown_releases_live_views_and_keeps_ledger() {
        let fx = fixture();
        fx.manager.show(&key("mail", "1"), None).await.unwrap();
        fx.manager.resume(&key("chat", "1")).await.unwrap();
        fx.manager.hibernate(&key("chat", "1")).await;

        fx.manager.shutdown().await;

        assert!(fx.manager.get_all().is_empty());
        assert_eq!(fx.provider.releases(), 2);
        assert_eq!(fx.store.hibernated(), vec![key("chat", "1")]);
    }

    #[tokio::test]
    async fn metrics_are_zero_for_unknown_and_hibernated() {
        let fx = fixture();
        let k = key("mail", "1");
        assert_eq!(fx.manager.metrics(&k), MetricsSample::default());

        fx.manager.resume(&k).await.unwrap();
        fx.manager.hibernate(&k).await;
        assert_eq!(fx.manager.metrics(&k), MetricsSample::default());
    }

    #[tokio::test]
    async fn touch_is_noop_for_unknown() {
        let fx = fixture();
        assert!(!fx.manager.touch(&key("mail", "1")));
        fx.manager.resume(&key("mail", "1")).await.unwrap();
        assert!(fx.manager.touch(&key("mail", "1")));
    }
}
