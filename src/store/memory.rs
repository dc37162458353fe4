//! In-process store: configuration and ledger kept in memory.
//!
//! Useful for embedding hosts that keep their own persistence and for
//! tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;

use super::{AppRecord, ConfigStore, HibernatedView, HibernationLedger, StoreError, WorkspacePolicy};
use crate::view::ViewKey;

#[derive(Default)]
struct Inner {
    apps: HashMap<String, AppRecord>,
    workspaces: HashMap<String, WorkspacePolicy>,
    excluded: HashSet<String>,
    default_idle: Option<Duration>,
    hibernated: BTreeMap<ViewKey, HibernatedView>,
    ledger_writes: usize,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        f(&mut self.inner.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn put_app(&self, app: AppRecord) {
        self.with(|inner| inner.apps.insert(app.id.clone(), app));
    }

    pub fn remove_app(&self, app_id: &str) {
        self.with(|inner| inner.apps.remove(app_id));
    }

    pub fn put_workspace(&self, workspace_id: impl Into<String>, policy: WorkspacePolicy) {
        self.with(|inner| inner.workspaces.insert(workspace_id.into(), policy));
    }

    pub fn exclude(&self, app_id: impl Into<String>) {
        self.with(|inner| inner.excluded.insert(app_id.into()));
    }

    pub fn set_default_idle(&self, threshold: Option<Duration>) {
        self.with(|inner| inner.default_idle = threshold);
    }

    /// Keys currently recorded as hibernated, in key order.
    pub fn hibernated(&self) -> Vec<ViewKey> {
        self.with(|inner| inner.hibernated.keys().cloned().collect())
    }

    /// Number of ledger mutations received so far.
    pub fn ledger_writes(&self) -> usize {
        self.with(|inner| inner.ledger_writes)
    }
}

impl ConfigStore for MemoryStore {
    fn app(&self, app_id: &str) -> Option<AppRecord> {
        self.with(|inner| inner.apps.get(app_id).cloned())
    }

    fn workspace_policy(&self, workspace_id: &str) -> Option<WorkspacePolicy> {
        self.with(|inner| inner.workspaces.get(workspace_id).copied())
    }

    fn excluded_app_ids(&self) -> HashSet<String> {
        self.with(|inner| inner.excluded.clone())
    }

    fn default_idle_threshold(&self) -> Option<Duration> {
        self.with(|inner| inner.default_idle)
    }
}

impl HibernationLedger for MemoryStore {
    fn mark_hibernated(&self, view: HibernatedView) -> BoxFuture<'_, Result<(), StoreError>> {
        self.with(|inner| {
            inner.ledger_writes += 1;
            inner.hibernated.insert(view.key.clone(), view);
        });
        futures::future::ready(Ok(())).boxed()
    }

    fn clear_hibernated(&self, key: ViewKey) -> BoxFuture<'_, Result<(), StoreError>> {
        self.with(|inner| {
            inner.ledger_writes += 1;
            inner.hibernated.remove(&key);
        });
        futures::future::ready(Ok(())).boxed()
    }

    fn load_hibernated(&self) -> BoxFuture<'_, Result<Vec<HibernatedView>, StoreError>> {
        let views = self.with(|inner| inner.hibernated.values().cloned().collect());
        futures::future::ready(Ok(views)).boxed()
    }
}
