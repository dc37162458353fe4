//! viewhost: lifecycle and hibernation manager for embedded web views.
//!
//! A host shell embeds many web apps, each possibly in several
//! instances. This crate keeps one registry entry per app instance,
//! guarantees at most one of them is on screen, and releases the
//! browsing contexts of views left idle in the background so their
//! memory is returned while their identity, partition and URL survive
//! for a transparent resume.
//!
//! [`lifecycle::LifecycleManager`] is the entry point. It is generic over
//! a [`provider::ContextProvider`] that actually builds browsing
//! contexts; [`provider::process::ProcessProvider`] runs one child
//! process per view. [`hibernation::scheduler::HibernationScheduler`]
//! sweeps idle views on a timer.

pub mod clock;
pub mod hibernation;
pub mod lifecycle;
pub mod metrics;
pub mod provider;
pub mod store;
pub mod view;

#[cfg(test)]
pub(crate) mod testing;

pub use lifecycle::{LifecycleError, LifecycleManager, ManagerConfig};
pub use view::{Bounds, ViewKey, ViewSnapshot, Visibility};
