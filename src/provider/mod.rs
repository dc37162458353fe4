//! Browsing-context collaborator: the thing that actually loads and
//! renders a URL.
//!
//! The lifecycle manager never renders anything itself. It asks a
//! [`ContextProvider`] for a fresh [`BrowsingContext`] when a view has to
//! be materialized and drives the context's attach/detach/release calls
//! as the view moves between foreground, background and hibernation.

pub mod process;

use futures::future::BoxFuture;

use crate::view::{Bounds, ViewKey};

/// Browsing-context provider error.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("failed to spawn context: {0}")]
    Spawn(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),
    #[error("context is no longer running")]
    Gone,
    #[error("{0}")]
    Other(String),
}

/// Everything a provider needs to build a context for one view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSpec {
    pub key: ViewKey,
    /// Isolation scope for cookies, storage and cache.
    pub partition: String,
    /// Initial URL to load.
    pub url: String,
}

/// One live, embeddable browsing context.
///
/// Owned exclusively by a single registry entry. Quick requests
/// (attach, detach, navigate) are synchronous because they are issued
/// while the registry is locked; tearing the context down is the only
/// operation allowed to take time.
pub trait BrowsingContext: Send + 'static {
    /// Display the context inside `bounds` (or its previous bounds).
    fn attach(&mut self, bounds: Option<Bounds>) -> Result<(), ProviderError>;

    /// Stop displaying the context. The context stays resident.
    fn detach(&mut self) -> Result<(), ProviderError>;

    /// Start loading `url`.
    fn navigate(&mut self, url: &str) -> Result<(), ProviderError>;

    /// Reload the current page.
    fn reload(&mut self) -> Result<(), ProviderError>;

    /// Whether the underlying resource is still running.
    fn is_alive(&mut self) -> bool;

    /// OS process hosting the context, if there is one.
    fn os_pid(&self) -> Option<u32>;

    /// Release the underlying resource. Consumes the context so it can
    /// only happen once.
    fn release(self) -> BoxFuture<'static, Result<(), ProviderError>>;
}

/// Creates browsing contexts.
///
/// Creation may be slow (process start, I/O). The registry never holds
/// its lock across the returned future.
pub trait ContextProvider: Send + Sync + 'static {
    type Context: BrowsingContext;

    fn create(&self, spec: ContextSpec) -> BoxFuture<'_, Result<Self::Context, ProviderError>>;
}
