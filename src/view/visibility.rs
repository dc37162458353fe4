//! Visibility controller: moves views on and off the display.
//!
//! The foreground slot lives inside the registry state, so every
//! transition here is a single critical section: the previous foreground
//! view is detached and the slot cleared before the new view is attached
//! and written into it. Two views are never foreground at once, and the
//! slot is empty only inside that critical section.

use std::sync::Arc;

use crate::provider::BrowsingContext;

use super::registry::{RegistryState, ViewRegistry};
use super::{Bounds, ViewKey};

/// Result of a [`VisibilityController::show`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowOutcome {
    /// The view became the foreground view.
    Shown,
    /// The view already was the foreground view; only its activity stamp
    /// (and bounds, if given) changed.
    AlreadyForeground,
    /// The view is unknown or hibernated and must be materialized first.
    NotLive,
}

pub struct VisibilityController<C> {
    registry: Arc<ViewRegistry<C>>,
}

impl<C: BrowsingContext> VisibilityController<C> {
    pub fn new(registry: Arc<ViewRegistry<C>>) -> Self {
        Self { registry }
    }

    /// Make `key` the foreground view, demoting the current one first.
    pub fn show(&self, key: &ViewKey, bounds: Option<Bounds>) -> ShowOutcome {
        let now = self.registry.now();
        let mut state = self.registry.lock();

        match state.entries.get(key) {
            Some(entry) if entry.is_live() => {}
            _ => return ShowOutcome::NotLive,
        }

        if state.foreground.as_ref() == Some(key) {
            if let Some(entry) = state.entries.get_mut(key) {
                entry.mark_active(now);
                if let Some(bounds) = bounds.filter(|b| entry.bounds != Some(*b)) {
                    entry.bounds = Some(bounds);
                    if let Some(context) = entry.context_mut()
                        && let Err(e) = context.attach(Some(bounds))
                    {
                        tracing::warn!(view = %key, error = %e, "resize of foreground view failed");
                    }
                }
            }
            return ShowOutcome::AlreadyForeground;
        }

        demote_foreground(&mut state, now);

        if let Some(entry) = state.entries.get_mut(key) {
            let bounds = bounds.or(entry.bounds);
            entry.bounds = bounds;
            entry.mark_active(now);
            if let Some(context) = entry.context_mut()
                && let Err(e) = context.attach(bounds)
            {
                // The context is alive; a failed attach is a display
                // problem, not a lifecycle one.
                tracing::warn!(view = %key, error = %e, "attach failed");
            }
        }
        state.foreground = Some(key.clone());
        tracing::debug!(view = %key, "view moved to foreground");
        ShowOutcome::Shown
    }

    /// Demote `key` to background if it is the foreground view. Anything
    /// else is a no-op. Returns whether a view was demoted.
    pub fn hide(&self, key: &ViewKey) -> bool {
        let now = self.registry.now();
        let mut state = self.registry.lock();
        if state.foreground.as_ref() != Some(key) {
            return false;
        }
        demote_foreground(&mut state, now).is_some()
    }

    /// Demote whatever is in the foreground.
    pub fn hide_all(&self) -> Option<ViewKey> {
        let now = self.registry.now();
        let mut state = self.registry.lock();
        demote_foreground(&mut state, now)
    }

    pub fn foreground(&self) -> Option<ViewKey> {
        self.registry.lock().foreground.clone()
    }
}

/// Detach the foreground view and clear the slot. The view's idle clock
/// restarts from the moment it left the display.
fn demote_foreground<C: BrowsingContext>(state: &mut RegistryState<C>, now: std::time::Instant) -> Option<ViewKey> {
    let previous = state.foreground.take()?;
    if let Some(entry) = state.entries.get_mut(&previous) {
        entry.mark_active(now);
        if let Some(context) = entry.context_mut()
            && let Err(e) = context.detach()
        {
            tracing::warn!(view = %previous, error = %e, "detach failed");
        }
    }
    tracing::debug!(view = %previous, "view moved to background");
    Some(previous)
}
