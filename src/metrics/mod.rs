//! Best-effort memory and CPU sampling of the process behind a view.
//!
//! Sampling never fails: an unknown or hibernated view, a context with no
//! OS process, or a process that vanished all give a zeroed
//! [`MetricsSample`].

#[cfg(target_os = "linux")]
pub mod procfs;

use std::sync::Mutex;

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use crate::provider::BrowsingContext;
use crate::view::ViewKey;
use crate::view::registry::ViewRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MetricsSample {
    /// Resident set size.
    pub working_set_bytes: u64,
    /// Memory not shared with other processes.
    pub private_bytes: u64,
    /// CPU usage since the previous sample of the same process. The first
    /// sample of a process reads 0.
    pub cpu_percent: f32,
}

/// Holds the process table between samples so CPU usage has a baseline.
pub struct MetricsCollector {
    system: Mutex<System>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    /// Sample the process hosting `key`.
    pub fn sample<C: BrowsingContext>(&self, registry: &ViewRegistry<C>, key: &ViewKey) -> MetricsSample {
        let pid = registry
            .with_live(key, |entry| entry.context_mut().and_then(|c| c.os_pid()))
            .flatten();
        if pid.is_none() {
            tracing::trace!(view = %key, "no live process to sample");
        }
        self.sample_pid(pid)
    }

    pub fn sample_pid(&self, pid: Option<u32>) -> MetricsSample {
        let Some(pid) = pid else {
            return MetricsSample::default();
        };
        let sys_pid = Pid::from_u32(pid);

        let mut system = self.system.lock().unwrap_or_else(|e| e.into_inner());
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sys_pid]),
            true,
            ProcessRefreshKind::nothing().with_memory().with_cpu(),
        );
        let Some(process) = system.process(sys_pid) else {
            tracing::debug!(pid, "process vanished before sampling");
            return MetricsSample::default();
        };

        let working_set_bytes = process.memory();
        MetricsSample {
            working_set_bytes,
            private_bytes: private_bytes(pid).unwrap_or(working_set_bytes),
            cpu_percent: process.cpu_usage(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "linux")]
fn private_bytes(pid: u32) -> Option<u64> {
    procfs::private_bytes(pid)
}

#[cfg(not(target_os = "linux"))]
fn private_bytes(_pid: u32) -> Option<u64> {
    None
}
