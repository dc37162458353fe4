//! Browsing contexts hosted in child processes.
//!
//! Each view runs its own copy of a configured program (a kiosk-mode
//! browser, a webview shell) with a per-partition profile directory, so
//! two views in the same partition share cookies and storage while views
//! in different partitions never do. The program's argument list is a
//! template; `{url}`, `{partition}` and `{profile_dir}` are substituted
//! at every launch.
//!
//! A process cannot be reparented into the host window generically, so
//! attach and detach only track display state. Navigation and reload
//! restart the child on the new URL.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};

use super::{BrowsingContext, ContextProvider, ContextSpec, ProviderError};
use crate::view::{Bounds, ViewKey};

/// How long a context gets to exit after SIGTERM before it is killed.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ProcessConfig {
    pub program: PathBuf,
    /// Argument templates.
    pub args: Vec<String>,
    /// Parent of every partition's profile directory.
    pub profile_root: PathBuf,
    pub grace: Duration,
}

impl ProcessConfig {
    pub fn new(program: impl Into<PathBuf>, profile_root: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            profile_root: profile_root.into(),
            grace: DEFAULT_GRACE,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Profile directory for `partition`.
    pub fn profile_dir(&self, partition: &str) -> PathBuf {
        self.profile_root.join(sanitize(partition))
    }
}

/// Map a partition key to a single safe path component.
fn sanitize(partition: &str) -> String {
    partition
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn expand(template: &str, url: &str, partition: &str, profile_dir: &Path) -> String {
    template
        .replace("{url}", url)
        .replace("{partition}", partition)
        .replace("{profile_dir}", &profile_dir.to_string_lossy())
}

pub struct ProcessProvider {
    config: ProcessConfig,
}

impl ProcessProvider {
    pub fn new(config: ProcessConfig) -> Self {
        Self { config }
    }
}

impl ContextProvider for ProcessProvider {
    type Context = ProcessContext;

    fn create(&self, spec: ContextSpec) -> BoxFuture<'_, Result<ProcessContext, ProviderError>> {
        async move {
            let profile_dir = self.config.profile_dir(&spec.partition);
            tokio::fs::create_dir_all(&profile_dir).await?;

            let launch = Launch {
                program: self.config.program.clone(),
                args: self.config.args.clone(),
                partition: spec.partition,
                profile_dir,
            };
            let child = launch.spawn(&spec.url)?;
            tracing::debug!(view = %spec.key, pid = ?child.id(), "context process started");

            Ok(ProcessContext {
                key: spec.key,
                launch,
                url: spec.url,
                child,
                attached: false,
                bounds: None,
                grace: self.config.grace,
            })
        }
        .boxed()
    }
}

/// Everything needed to start the program again.
#[derive(Debug, Clone)]
struct Launch {
    program: PathBuf,
    args: Vec<String>,
    partition: String,
    profile_dir: PathBuf,
}

impl Launch {
    fn spawn(&self, url: &str) -> Result<Child, ProviderError> {
        Command::new(&self.program)
            .args(
                self.args
                    .iter()
                    .map(|arg| expand(arg, url, &self.partition, &self.profile_dir)),
            )
            .current_dir(&self.profile_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProviderError::Spawn(format!("{}: {e}", self.program.display())))
    }
}

pub struct ProcessContext {
    key: ViewKey,
    launch: Launch,
    url: String,
    child: Child,
    attached: bool,
    bounds: Option<Bounds>,
    grace: Duration,
}

impl ProcessContext {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn profile_dir(&self) -> &Path {
        &self.launch.profile_dir
    }

    /// Replace the child with a fresh one on the current URL. The old
    /// child is killed and reaped in the background.
    fn restart(&mut self) -> Result<(), ProviderError> {
        let child = self.launch.spawn(&self.url)?;
        let mut old = std::mem::replace(&mut self.child, child);
        if let Err(e) = old.start_kill() {
            tracing::debug!(view = %self.key, error = %e, "previous context process already gone");
        }
        tracing::debug!(view = %self.key, pid = ?self.child.id(), "context process restarted");
        Ok(())
    }
}

impl BrowsingContext for ProcessContext {
    fn attach(&mut self, bounds: Option<Bounds>) -> Result<(), ProviderError> {
        if !self.is_alive() {
            return Err(ProviderError::Gone);
        }
        self.attached = true;
        if bounds.is_some() {
            self.bounds = bounds;
        }
        tracing::trace!(view = %self.key, bounds = ?self.bounds, "attached");
        Ok(())
    }

    fn detach(&mut self) -> Result<(), ProviderError> {
        self.attached = false;
        Ok(())
    }

    fn navigate(&mut self, url: &str) -> Result<(), ProviderError> {
        self.url = url.to_string();
        self.restart()
    }

    fn reload(&mut self) -> Result<(), ProviderError> {
        self.restart()
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn os_pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn release(self) -> BoxFuture<'static, Result<(), ProviderError>> {
        let ProcessContext { key, child, grace, .. } = self;
        async move {
            terminate(&key, child, grace).await?;
            tracing::debug!(view = %key, "context process exited");
            Ok(())
        }
        .boxed()
    }
}

/// SIGTERM, wait up to `grace`, then SIGKILL.
async fn terminate(key: &ViewKey, mut child: Child, grace: Duration) -> Result<(), ProviderError> {
    // Already reaped.
    let Some(pid) = child.id() else {
        return Ok(());
    };
    let pid = i32::try_from(pid).map_err(|_| ProviderError::Other(format!("pid {pid} out of range")))?;

    match signal::kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!(view = %key, pid, error = %e, "SIGTERM failed"),
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => {
            status?;
            Ok(())
        }
        Err(_) => {
            tracing::warn!(view = %key, pid, grace_ms = grace.as_millis() as u64, "context ignored SIGTERM; killing");
            child.kill().await?;
            Ok(())
        }
    }
}
