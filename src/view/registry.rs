//! View registry: the one shared, mutable map of every known view.
//!
//! Entries are keyed by [`ViewKey`] and carry their context as an explicit
//! [`Residency`]: either `Live(context)` or `Hibernated`. A hibernated
//! entry therefore cannot hold a context, by construction.
//!
//! Locking: a single `std::sync::Mutex` guards the map and the foreground
//! slot. It is never held across an `.await`. Context construction and
//! release happen outside it; only the map mutation is exclusive.
//! Per-key creation gates (`tokio::sync::Mutex`) make materialization
//! single-flight: concurrent callers for the same key wait for the first
//! one instead of invoking the factory again.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crate::clock::Clock;
use crate::provider::BrowsingContext;

use super::{Bounds, ViewKey, ViewSnapshot, Visibility};

/// Whether an entry currently owns a live context.
pub(crate) enum Residency<C> {
    Live(C),
    Hibernated,
}

pub(crate) struct ViewEntry<C> {
    pub(crate) partition: String,
    pub(crate) url: String,
    pub(crate) last_active_at: Instant,
    pub(crate) activity: u64,
    pub(crate) bounds: Option<Bounds>,
    pub(crate) residency: Residency<C>,
}

impl<C> ViewEntry<C> {
    pub(crate) fn is_live(&self) -> bool {
        matches!(self.residency, Residency::Live(_))
    }

    /// Record a use of the view at `now`.
    pub(crate) fn mark_active(&mut self, now: Instant) {
        self.last_active_at = now;
        self.activity = self.activity.wrapping_add(1);
    }

    pub(crate) fn context_mut(&mut self) -> Option<&mut C> {
        match &mut self.residency {
            Residency::Live(context) => Some(context),
            Residency::Hibernated => None,
        }
    }
}

/// Map plus the foreground slot. Guarded together so "at most one
/// foreground view" is a property of the data layout: there is only one
/// slot to put a key in.
pub(crate) struct RegistryState<C> {
    pub(crate) entries: HashMap<ViewKey, ViewEntry<C>>,
    pub(crate) foreground: Option<ViewKey>,
}

impl<C> RegistryState<C> {
    pub(crate) fn visibility(&self, key: &ViewKey) -> Option<Visibility> {
        self.snapshot_of(key).map(|s| s.visibility)
    }

    pub(crate) fn snapshot_of(&self, key: &ViewKey) -> Option<ViewSnapshot> {
        let entry = self.entries.get(key)?;
        Some(describe(key, entry, self.foreground.as_ref() == Some(key)))
    }
}

fn describe<C>(key: &ViewKey, entry: &ViewEntry<C>, in_foreground: bool) -> ViewSnapshot {
    let visibility = match entry.residency {
        Residency::Hibernated => Visibility::Hibernated,
        Residency::Live(_) if in_foreground => Visibility::Foreground,
        Residency::Live(_) => Visibility::Background,
    };
    ViewSnapshot {
        key: key.clone(),
        partition: entry.partition.clone(),
        url: entry.url.clone(),
        last_active_at: entry.last_active_at,
        activity: entry.activity,
        visibility,
    }
}

/// What a hibernated entry remembers, handed to the factory so it can
/// rebuild the context in the same partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retained {
    pub partition: String,
    pub url: String,
}

/// A freshly built context plus the identity it was built for.
pub struct Materialized<C> {
    pub context: C,
    pub partition: String,
    pub url: String,
}

/// Result of a conditional hibernation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HibernateOutcome {
    Hibernated,
    /// Already hibernated or not in the registry.
    NotLive,
    /// The entry is the foreground view.
    Foreground,
    /// The entry saw activity after the caller's snapshot.
    Touched,
}

pub struct ViewRegistry<C> {
    state: Mutex<RegistryState<C>>,
    gates: Mutex<HashMap<ViewKey, Arc<tokio::sync::Mutex<()>>>>,
    clock: Arc<dyn Clock>,
}

impl<C: BrowsingContext> ViewRegistry<C> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                entries: HashMap::new(),
                foreground: None,
            }),
            gates: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, RegistryState<C>> {
        // Every critical section leaves the state consistent, so a panic
        // elsewhere does not invalidate it.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn now(&self) -> Instant {
        self.clock.now()
    }

    fn gate(&self, key: &ViewKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut gates = self.gates.lock().unwrap_or_else(|e| e.into_inner());
        gates.entry(key.clone()).or_default().clone()
    }

    /// Touch and snapshot `key` if it holds a context that is still alive.
    fn live_snapshot(&self, key: &ViewKey) -> Option<ViewSnapshot> {
        let now = self.now();
        let mut state = self.lock();
        let entry = state.entries.get_mut(key)?;
        if !entry.context_mut()?.is_alive() {
            return None;
        }
        entry.mark_active(now);
        state.snapshot_of(key)
    }

    /// Take a dead context out of `key`, leaving the entry hibernated so
    /// it is rebuilt in the same partition. A dead foreground view also
    /// gives up the slot; nothing is on screen for it any more.
    fn evict_dead(&self, key: &ViewKey) -> Option<C> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let entry = state.entries.get_mut(key)?;
        if entry.context_mut()?.is_alive() {
            return None;
        }
        if state.foreground.as_ref() == Some(key) {
            state.foreground = None;
        }
        match std::mem::replace(&mut entry.residency, Residency::Hibernated) {
            Residency::Live(context) => Some(context),
            Residency::Hibernated => None,
        }
    }

    /// Return the live entry for `key`, materializing it with `factory`
    /// when it is absent or hibernated.
    ///
    /// The factory receives the retained identity of a hibernated entry
    /// (`None` for a brand-new one). A live entry whose context died is
    /// treated as hibernated: its context is released and rebuilt. A
    /// factory error leaves the entry absent or hibernated. A freshly
    /// materialized entry is `Background`.
    pub async fn get_or_create<F, Fut, E>(&self, key: &ViewKey, factory: F) -> Result<ViewSnapshot, E>
    where
        F: FnOnce(Option<Retained>) -> Fut,
        Fut: Future<Output = Result<Materialized<C>, E>>,
    {
        if let Some(snapshot) = self.live_snapshot(key) {
            return Ok(snapshot);
        }

        let gate = self.gate(key);
        let _creating = gate.lock().await;

        // Someone else may have finished while we waited on the gate.
        if let Some(snapshot) = self.live_snapshot(key) {
            return Ok(snapshot);
        }

        if let Some(dead) = self.evict_dead(key) {
            tracing::warn!(view = %key, "context died; rebuilding");
            release_logged(key, dead).await;
        }

        let retained = {
            let state = self.lock();
            state.entries.get(key).map(|entry| Retained {
                partition: entry.partition.clone(),
                url: entry.url.clone(),
            })
        };

        let made = factory(retained).await?;

        let now = self.now();
        let (snapshot, duplicate) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let in_foreground = state.foreground.as_ref() == Some(key);
            let outcome = match state.entries.entry(key.clone()) {
                Entry::Occupied(mut occupied) => {
                    let entry = occupied.get_mut();
                    entry.mark_active(now);
                    if entry.is_live() {
                        // A gate was dropped by `remove` while a caller still
                        // held the old one; keep the entry that got here first.
                        (describe(key, entry, in_foreground), Some(made.context))
                    } else {
                        entry.residency = Residency::Live(made.context);
                        entry.url = made.url;
                        (describe(key, entry, in_foreground), None)
                    }
                }
                Entry::Vacant(vacant) => {
                    let entry = vacant.insert(ViewEntry {
                        partition: made.partition,
                        url: made.url,
                        last_active_at: now,
                        activity: 0,
                        bounds: None,
                        residency: Residency::Live(made.context),
                    });
                    (describe(key, entry, in_foreground), None)
                }
            };
            outcome
        };

        if let Some(context) = duplicate {
            release_logged(key, context).await;
        } else {
            tracing::debug!(view = %key, partition = %snapshot.partition, "view materialized");
        }
        Ok(snapshot)
    }

    /// Seed a hibernated entry, e.g. from persisted state on startup.
    /// Returns `false` if the key is already known.
    pub fn insert_hibernated(&self, key: ViewKey, partition: String, url: String) -> bool {
        let now = self.now();
        let mut state = self.lock();
        if state.entries.contains_key(&key) {
            return false;
        }
        state.entries.insert(
            key,
            ViewEntry {
                partition,
                url,
                last_active_at: now,
                activity: 0,
                bounds: None,
                residency: Residency::Hibernated,
            },
        );
        true
    }

    /// Remove `key`, releasing its context if live. Unknown keys are a
    /// no-op. Waits for an in-flight materialization of the same key so
    /// the removal cannot be undone by it.
    pub async fn remove(&self, key: &ViewKey) -> bool {
        let gate = self.gate(key);
        let creating = gate.lock().await;

        let removed = {
            let mut state = self.lock();
            if state.foreground.as_ref() == Some(key) {
                state.foreground = None;
            }
            state.entries.remove(key)
        };
        self.gates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        drop(creating);

        match removed {
            Some(entry) => {
                if let Residency::Live(context) = entry.residency {
                    release_logged(key, context).await;
                }
                true
            }
            None => false,
        }
    }

    /// Record activity on `key`. Unknown keys are a no-op.
    pub fn touch(&self, key: &ViewKey) -> bool {
        let now = self.now();
        let mut state = self.lock();
        match state.entries.get_mut(key) {
            Some(entry) => {
                entry.mark_active(now);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, key: &ViewKey) -> Option<ViewSnapshot> {
        self.lock().snapshot_of(key)
    }

    /// Copies of every entry, ordered by key.
    pub fn snapshot(&self) -> Vec<ViewSnapshot> {
        let state = self.lock();
        let mut out: Vec<ViewSnapshot> = state
            .entries
            .keys()
            .filter_map(|key| state.snapshot_of(key))
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }

    /// Hibernate `key` if it is live and not in the foreground.
    ///
    /// With `seen_activity`, the entry is only hibernated if its activity
    /// counter still equals that value (compare-and-swap against a sweep
    /// snapshot). The context is released after the lock is dropped;
    /// release failures are logged and the entry stays hibernated.
    pub async fn hibernate(&self, key: &ViewKey, seen_activity: Option<u64>) -> HibernateOutcome {
        let context = {
            let mut state = self.lock();
            if state.foreground.as_ref() == Some(key) {
                return HibernateOutcome::Foreground;
            }
            let Some(entry) = state.entries.get_mut(key) else {
                return HibernateOutcome::NotLive;
            };
            if !entry.is_live() {
                return HibernateOutcome::NotLive;
            }
            if seen_activity.is_some_and(|seen| entry.activity != seen) {
                return HibernateOutcome::Touched;
            }
            match std::mem::replace(&mut entry.residency, Residency::Hibernated) {
                Residency::Live(context) => context,
                Residency::Hibernated => return HibernateOutcome::NotLive,
            }
        };

        release_logged(key, context).await;
        HibernateOutcome::Hibernated
    }

    /// Run `f` against the live context of `key`.
    pub(crate) fn with_live<R>(&self, key: &ViewKey, f: impl FnOnce(&mut ViewEntry<C>) -> R) -> Option<R> {
        let mut state = self.lock();
        let entry = state.entries.get_mut(key)?;
        if !entry.is_live() {
            return None;
        }
        Some(f(entry))
    }

    /// Empty the registry, handing back every live context.
    pub(crate) fn drain(&self) -> Vec<(ViewKey, C)> {
        let mut state = self.lock();
        state.foreground = None;
        state
            .entries
            .drain()
            .filter_map(|(key, entry)| match entry.residency {
                Residency::Live(context) => Some((key, context)),
                Residency::Hibernated => None,
            })
            .collect()
    }
}

/// Detach and release a context, logging instead of failing.
pub(crate) async fn release_logged<C: BrowsingContext>(key: &ViewKey, mut context: C) {
    if let Err(e) = context.detach() {
        tracing::debug!(view = %key, error = %e, "detach before release failed");
    }
    if let Err(e) = context.release().await {
        tracing::warn!(view = %key, error = %e, "context release failed; treating as released");
    }
}
