//! Scripted browsing-context provider for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::Semaphore;

use crate::clock::ManualClock;
use crate::lifecycle::{LifecycleManager, ManagerConfig};
use crate::provider::{BrowsingContext, ContextProvider, ContextSpec, ProviderError};
use crate::store::memory::MemoryStore;
use crate::store::{AppRecord, SharingMode, WorkspacePolicy};
use crate::view::Bounds;

/// Counters and switches shared by a [`FakeProvider`] and its contexts.
#[derive(Default)]
pub(crate) struct FakeState {
    pub creates: AtomicUsize,
    pub releases: AtomicUsize,
    pub fail_create: AtomicBool,
    pub fail_release: AtomicBool,
    /// Makes `navigate` and `reload` fail.
    pub fail_drive: AtomicBool,
    /// Human-readable call log, e.g. `"attach mail/1"`.
    pub events: Mutex<Vec<String>>,
    /// When set, `create` waits for a permit before returning.
    pub gate: Mutex<Option<Arc<Semaphore>>>,
}

impl FakeState {
    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

pub(crate) struct FakeProvider {
    pub state: Arc<FakeState>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            state: Arc::new(FakeState::default()),
        }
    }

    pub fn creates(&self) -> usize {
        self.state.creates.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.state.releases.load(Ordering::SeqCst)
    }

    pub fn fail_create(&self, fail: bool) {
        self.state.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_release(&self, fail: bool) {
        self.state.fail_release.store(fail, Ordering::SeqCst);
    }

    pub fn fail_drive(&self, fail: bool) {
        self.state.fail_drive.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `create` block until the returned semaphore
    /// gets a permit.
    pub fn hold_creations(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.state.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn events(&self) -> Vec<String> {
        self.state.events.lock().unwrap().clone()
    }

    pub fn clear_events(&self) {
        self.state.events.lock().unwrap().clear();
    }
}

impl ContextProvider for FakeProvider {
    type Context = FakeContext;

    fn create(&self, spec: ContextSpec) -> BoxFuture<'_, Result<FakeContext, ProviderError>> {
        let state = self.state.clone();
        async move {
            let gate = state.gate.lock().unwrap().clone();
            if let Some(gate) = gate {
                let permit = gate
                    .acquire()
                    .await
                    .map_err(|e| ProviderError::Other(e.to_string()))?;
                permit.forget();
            }
            state.creates.fetch_add(1, Ordering::SeqCst);
            if state.fail_create.load(Ordering::SeqCst) {
                return Err(ProviderError::Spawn("scripted failure".into()));
            }
            state.record(format!("create {}", spec.key));
            Ok(FakeContext {
                spec,
                alive: true,
                attached: false,
                state,
            })
        }
        .boxed()
    }
}

pub(crate) struct FakeContext {
    pub spec: ContextSpec,
    pub alive: bool,
    pub attached: bool,
    state: Arc<FakeState>,
}

impl BrowsingContext for FakeContext {
    fn attach(&mut self, _bounds: Option<Bounds>) -> Result<(), ProviderError> {
        self.attached = true;
        self.state.record(format!("attach {}", self.spec.key));
        Ok(())
    }

    fn detach(&mut self) -> Result<(), ProviderError> {
        self.attached = false;
        self.state.record(format!("detach {}", self.spec.key));
        Ok(())
    }

    fn navigate(&mut self, url: &str) -> Result<(), ProviderError> {
        if self.state.fail_drive.load(Ordering::SeqCst) {
            return Err(ProviderError::Other("scripted navigate failure".into()));
        }
        self.spec.url = url.to_string();
        self.state.record(format!("navigate {} {url}", self.spec.key));
        Ok(())
    }

    fn reload(&mut self) -> Result<(), ProviderError> {
        if self.state.fail_drive.load(Ordering::SeqCst) {
            return Err(ProviderError::Other("scripted reload failure".into()));
        }
        self.state.record(format!("reload {}", self.spec.key));
        Ok(())
    }

    fn is_alive(&mut self) -> bool {
        self.alive
    }

    fn os_pid(&self) -> Option<u32> {
        Some(std::process::id())
    }

    fn release(mut self) -> BoxFuture<'static, Result<(), ProviderError>> {
        self.alive = false;
        let state = self.state.clone();
        let key = self.spec.key.clone();
        async move {
            state.releases.fetch_add(1, Ordering::SeqCst);
            state.record(format!("release {key}"));
            if state.fail_release.load(Ordering::SeqCst) {
                Err(ProviderError::Other("scripted release failure".into()))
            } else {
                Ok(())
            }
        }
        .boxed()
    }
}

/// A lifecycle manager over a [`FakeProvider`] and a [`MemoryStore`]
/// holding one enabled workspace (`work`, no threshold of its own) with
/// a shared app `mail` and an isolated app `chat`.
pub(crate) struct Fixture {
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
    pub provider: Arc<FakeProvider>,
    pub manager: Arc<LifecycleManager<FakeProvider>>,
}

pub(crate) fn fixture() -> Fixture {
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(MemoryStore::new());
    store.put_workspace(
        "work",
        WorkspacePolicy {
            enabled: true,
            idle_threshold: None,
        },
    );
    for (id, mode) in [("mail", SharingMode::Shared), ("chat", SharingMode::Isolated)] {
        store.put_app(AppRecord {
            id: id.into(),
            workspace_id: "work".into(),
            url: format!("https://{id}.test/"),
            sharing_mode: mode,
            idle_override: None,
        });
    }
    let provider = Arc::new(FakeProvider::new());
    let manager = Arc::new(LifecycleManager::new(
        provider.clone(),
        store.clone(),
        store.clone(),
        clock.clone(),
        ManagerConfig::default(),
    ));
    Fixture {
        clock,
        store,
        provider,
        manager,
    }
}
