//! Policy/config store and persistence collaborators.
//!
//! [`ConfigStore`] answers "what is this app and how should it be
//! hibernated"; [`HibernationLedger`] remembers which views were
//! hibernated so they come back hibernated after a restart. Both are
//! owned by other parts of the shell; this crate only reads the former
//! and writes one flag per view to the latter.

pub mod catalog;
pub mod ledger;
pub mod memory;

use std::collections::HashSet;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

pub use crate::view::partition::SharingMode;
use crate::view::ViewKey;

/// Store error.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid catalog document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to encode ledger: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("failed to decode ledger: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// What the lifecycle manager needs to know about an app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppRecord {
    pub id: String,
    pub workspace_id: String,
    pub url: String,
    pub sharing_mode: SharingMode,
    /// Per-app idle threshold. Replaces the workspace default entirely.
    pub idle_override: Option<Duration>,
}

/// A workspace's hibernation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkspacePolicy {
    pub enabled: bool,
    /// Workspace default idle threshold; `None` falls back to the global
    /// default.
    pub idle_threshold: Option<Duration>,
}

/// Read access to app, workspace and exclusion configuration.
pub trait ConfigStore: Send + Sync {
    fn app(&self, app_id: &str) -> Option<AppRecord>;

    fn workspace_policy(&self, workspace_id: &str) -> Option<WorkspacePolicy>;

    /// Apps the hibernation sweep must never touch.
    fn excluded_app_ids(&self) -> HashSet<String>;

    /// Global default idle threshold, if the store carries one.
    fn default_idle_threshold(&self) -> Option<Duration> {
        None
    }

    /// Pick up external edits. Called once per sweep tick.
    fn refresh(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// A hibernated view as persisted. Carries the partition and URL the
/// view was built with, so a restart brings it back in the same cookie
/// jar on the same page even if the app's sharing mode or URL changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HibernatedView {
    pub key: ViewKey,
    pub partition: String,
    pub url: String,
}

/// Persistent record of which views are hibernated.
pub trait HibernationLedger: Send + Sync {
    /// Record `view` as hibernated, replacing any earlier record of its key.
    fn mark_hibernated(&self, view: HibernatedView) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Forget `key`. Unknown keys are a no-op.
    fn clear_hibernated(&self, key: ViewKey) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Every recorded view, ordered by key.
    fn load_hibernated(&self) -> BoxFuture<'_, Result<Vec<HibernatedView>, StoreError>>;
}
