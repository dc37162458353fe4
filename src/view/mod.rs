//! View identity and the types shared by the registry, the visibility
//! controller and the lifecycle facade.

pub mod partition;
pub mod registry;
pub mod visibility;

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Identity of one embedded view: an app and one of its instances.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ViewKey {
    pub app_id: String,
    pub instance_id: String,
}

impl ViewKey {
    pub fn new(app_id: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            instance_id: instance_id.into(),
        }
    }
}

impl fmt::Display for ViewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.app_id, self.instance_id)
    }
}

/// Where a view currently sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    /// Attached and displayed. At most one view is in this state.
    Foreground,
    /// Live but detached from the display.
    Background,
    /// Underlying context released; identity retained for recreation.
    Hibernated,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Foreground => "foreground",
            Self::Background => "background",
            Self::Hibernated => "hibernated",
        };
        f.write_str(s)
    }
}

/// Display rectangle handed to a context when it is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Read-only copy of a registry entry.
///
/// Holds no reference to the underlying context, so a snapshot can be
/// inspected while the registry keeps changing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSnapshot {
    pub key: ViewKey,
    pub partition: String,
    pub url: String,
    pub last_active_at: Instant,
    /// Bumped on every use of the view, so two snapshots with the same
    /// value saw no activity in between even when the clock did not move.
    pub activity: u64,
    pub visibility: Visibility,
}
