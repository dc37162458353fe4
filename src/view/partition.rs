//! Partition resolution: maps an app instance to its storage scope.
//!
//! Keys are name-based UUIDs (v5) so they are identical across restarts:
//! a returning user lands in the same cookie jar. Shared instances hash
//! only their workspace; isolated instances hash the app and instance.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for every partition UUID this crate derives.
const PARTITION_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a3e_58d4_4b8e_9a0f_3c71_d2e5_b604);

/// Prefix marking a partition as persisted to disk by the context provider.
pub const PERSIST_PREFIX: &str = "persist:";

/// How an app's instances scope their cookies and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SharingMode {
    /// Every instance in the workspace shares one partition.
    Shared,
    /// Each instance gets its own partition.
    #[default]
    Isolated,
}

impl std::fmt::Display for SharingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shared => f.write_str("shared"),
            Self::Isolated => f.write_str("isolated"),
        }
    }
}

/// Resolve the partition key for an app instance.
///
/// Pure and total. Changing an app's sharing mode only affects instances
/// created afterwards; existing views keep the partition they were built
/// with.
pub fn resolve(app_id: &str, instance_id: &str, workspace_id: &str, mode: SharingMode) -> String {
    match mode {
        SharingMode::Shared => {
            let id = Uuid::new_v5(&PARTITION_NAMESPACE, &name_bytes(&["workspace", workspace_id]));
            format!("{PERSIST_PREFIX}shared-{}", id.simple())
        }
        SharingMode::Isolated => {
            let id = Uuid::new_v5(
                &PARTITION_NAMESPACE,
                &name_bytes(&["instance", app_id, instance_id]),
            );
            format!("{PERSIST_PREFIX}isolated-{}", id.simple())
        }
    }
}

/// Length-prefix each part so `("ab", "c")` and `("a", "bc")` never collide.
fn name_bytes(parts: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    for part in parts {
        out.extend_from_slice(&(part.len() as u64).to_be_bytes());
        out.extend_from_slice(part.as_bytes());
    }
    out
}
