//! Hibernation policy resolution and the idle sweep.
//!
//! Policy precedence for an app: the app's own idle override, then its
//! workspace's default, then the global default. The workspace's
//! `enabled` flag gates all of it. Anything that cannot be resolved (the
//! app or its workspace is missing) resolves to "disabled", so an
//! incomplete configuration never evicts a view the user may be using.

pub mod scheduler;

use std::time::Duration;

use crate::store::ConfigStore;

/// Effective hibernation settings for one app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HibernationPolicy {
    pub enabled: bool,
    pub idle_threshold: Duration,
}

impl HibernationPolicy {
    pub const DISABLED: Self = Self {
        enabled: false,
        idle_threshold: Duration::MAX,
    };

    /// Whether a view idle for `idle` should be hibernated.
    pub fn is_expired(&self, idle: Duration) -> bool {
        self.enabled && idle > self.idle_threshold
    }
}

/// Resolve the policy for `app_id`.
///
/// `fallback` is the global default used when neither the store nor the
/// app or workspace set a threshold.
pub fn resolve_policy(store: &dyn ConfigStore, app_id: &str, fallback: Duration) -> HibernationPolicy {
    let Some(app) = store.app(app_id) else {
        return HibernationPolicy::DISABLED;
    };
    let Some(workspace) = store.workspace_policy(&app.workspace_id) else {
        return HibernationPolicy::DISABLED;
    };
    if !workspace.enabled {
        return HibernationPolicy::DISABLED;
    }

    let idle_threshold = app
        .idle_override
        .or(workspace.idle_threshold)
        .or_else(|| store.default_idle_threshold())
        .unwrap_or(fallback);

    HibernationPolicy {
        enabled: true,
        idle_threshold,
    }
}
