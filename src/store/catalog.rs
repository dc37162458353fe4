//! JSON catalog: apps, workspaces and exclusions read from the shell's
//! data file.
//!
//! The document is owned and written by the surrounding shell. It is
//! parsed once on open and cached; [`ConfigStore::refresh`] re-reads it
//! only when the file's modification time or size changed, so a sweep
//! tick costs one `stat` in the common case. A document that fails to
//! parse on refresh leaves the previous cache in place.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, SystemTime};

use serde::Deserialize;

use super::{AppRecord, ConfigStore, SharingMode, StoreError, WorkspacePolicy};

/// Instance used for apps whose document lists none.
pub const DEFAULT_INSTANCE: &str = "main";

#[derive(Debug, Default, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    global: GlobalSection,
    #[serde(default)]
    workspaces: Vec<WorkspaceDocument>,
    #[serde(default)]
    apps: Vec<AppDocument>,
    #[serde(default)]
    excluded_apps: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GlobalSection {
    idle_minutes: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct WorkspaceDocument {
    id: String,
    #[serde(default)]
    hibernation: HibernationSection,
}

#[derive(Debug, Default, Deserialize)]
struct HibernationSection {
    #[serde(default)]
    enabled: bool,
    idle_minutes: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct AppDocument {
    id: String,
    workspace_id: String,
    url: String,
    #[serde(default)]
    sharing_mode: SharingMode,
    idle_minutes: Option<u64>,
    #[serde(default)]
    instances: Vec<String>,
}

/// Parsed, indexed form of the document.
#[derive(Debug, Default)]
struct Catalog {
    default_idle: Option<Duration>,
    apps: HashMap<String, (AppRecord, Vec<String>)>,
    workspaces: HashMap<String, WorkspacePolicy>,
    excluded: HashSet<String>,
}

fn minutes(m: u64) -> Duration {
    Duration::from_secs(m.saturating_mul(60))
}

impl Catalog {
    fn parse(text: &str) -> Result<Self, StoreError> {
        let doc: CatalogDocument = serde_json::from_str(text)?;

        let apps = doc
            .apps
            .into_iter()
            .map(|app| {
                let instances = if app.instances.is_empty() {
                    vec![DEFAULT_INSTANCE.to_string()]
                } else {
                    app.instances
                };
                let record = AppRecord {
                    id: app.id.clone(),
                    workspace_id: app.workspace_id,
                    url: app.url,
                    sharing_mode: app.sharing_mode,
                    idle_override: app.idle_minutes.map(minutes),
                };
                (app.id, (record, instances))
            })
            .collect();

        let workspaces = doc
            .workspaces
            .into_iter()
            .map(|ws| {
                let policy = WorkspacePolicy {
                    enabled: ws.hibernation.enabled,
                    idle_threshold: ws.hibernation.idle_minutes.map(minutes),
                };
                (ws.id, policy)
            })
            .collect();

        Ok(Self {
            default_idle: doc.global.idle_minutes.map(minutes),
            apps,
            workspaces,
            excluded: doc.excluded_apps.into_iter().collect(),
        })
    }
}

/// File stamp used to detect external edits.
type Stamp = (Option<SystemTime>, u64);

pub struct JsonCatalog {
    path: PathBuf,
    catalog: RwLock<Catalog>,
    stamp: RwLock<Stamp>,
}

impl JsonCatalog {
    /// Read and parse the catalog at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let stamp = stamp_of(&path)?;
        let text = read(&path)?;
        Ok(Self {
            catalog: RwLock::new(Catalog::parse(&text)?),
            stamp: RwLock::new(stamp),
            path,
        })
    }

    /// Every app in the document, ordered by id.
    pub fn apps(&self) -> Vec<AppRecord> {
        let catalog = self.catalog.read().unwrap_or_else(|e| e.into_inner());
        let mut apps: Vec<AppRecord> = catalog.apps.values().map(|(app, _)| app.clone()).collect();
        apps.sort_by(|a, b| a.id.cmp(&b.id));
        apps
    }

    /// Instance ids declared for `app_id`; [`DEFAULT_INSTANCE`] if the
    /// app lists none, empty if the app is unknown.
    pub fn instances(&self, app_id: &str) -> Vec<String> {
        let catalog = self.catalog.read().unwrap_or_else(|e| e.into_inner());
        catalog
            .apps
            .get(app_id)
            .map(|(_, instances)| instances.clone())
            .unwrap_or_default()
    }
}

impl ConfigStore for JsonCatalog {
    fn app(&self, app_id: &str) -> Option<AppRecord> {
        let catalog = self.catalog.read().unwrap_or_else(|e| e.into_inner());
        catalog.apps.get(app_id).map(|(app, _)| app.clone())
    }

    fn workspace_policy(&self, workspace_id: &str) -> Option<WorkspacePolicy> {
        let catalog = self.catalog.read().unwrap_or_else(|e| e.into_inner());
        catalog.workspaces.get(workspace_id).copied()
    }

    fn excluded_app_ids(&self) -> HashSet<String> {
        let catalog = self.catalog.read().unwrap_or_else(|e| e.into_inner());
        catalog.excluded.clone()
    }

    fn default_idle_threshold(&self) -> Option<Duration> {
        let catalog = self.catalog.read().unwrap_or_else(|e| e.into_inner());
        catalog.default_idle
    }

    fn refresh(&self) -> Result<(), StoreError> {
        let stamp = stamp_of(&self.path)?;
        if *self.stamp.read().unwrap_or_else(|e| e.into_inner()) == stamp {
            return Ok(());
        }

        let parsed = Catalog::parse(&read(&self.path)?)?;
        *self.catalog.write().unwrap_or_else(|e| e.into_inner()) = parsed;
        *self.stamp.write().unwrap_or_else(|e| e.into_inner()) = stamp;
        tracing::info!(path = %self.path.display(), "catalog reloaded");
        Ok(())
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn read(path: &Path) -> Result<String, StoreError> {
    std::fs::read_to_string(path).map_err(|e| io_error(path, e))
}

fn stamp_of(path: &Path) -> Result<Stamp, StoreError> {
    let meta = std::fs::metadata(path).map_err(|e| io_error(path, e))?;
    Ok((meta.modified().ok(), meta.len()))
}
