//! File-backed hibernation ledger.
//!
//! Stores the hibernated views as a MessagePack array of
//! `{key: {app_id, instance_id}, partition, url}` maps. Every change
//! rewrites the whole file via a sibling temp file and an atomic rename,
//! so a crash mid-write leaves either the old or the new set, never a
//! torn one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::Mutex;

use super::{HibernatedView, HibernationLedger, StoreError};
use crate::view::ViewKey;

pub struct FileLedger {
    path: PathBuf,
    views: Mutex<BTreeMap<ViewKey, HibernatedView>>,
}

impl FileLedger {
    /// Open the ledger at `path`. A missing file is an empty ledger.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let views = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => rmp_serde::from_slice::<Vec<HibernatedView>>(&bytes)?
                .into_iter()
                .map(|view| (view.key.clone(), view))
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(StoreError::Io {
                    path: path.display().to_string(),
                    source: e,
                });
            }
        };
        Ok(Self {
            path,
            views: Mutex::new(views),
        })
    }

    async fn persist(&self, views: &BTreeMap<ViewKey, HibernatedView>) -> Result<(), StoreError> {
        let bytes = rmp_serde::to_vec_named(&views.values().collect::<Vec<_>>())?;
        let tmp = self.path.with_extension("tmp");
        let io = |source: std::io::Error| StoreError::Io {
            path: self.path.display().to_string(),
            source,
        };
        tokio::fs::write(&tmp, &bytes).await.map_err(io)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io)?;
        Ok(())
    }
}

impl HibernationLedger for FileLedger {
    fn mark_hibernated(&self, view: HibernatedView) -> BoxFuture<'_, Result<(), StoreError>> {
        async move {
            // Held across the write so concurrent marks hit the disk in
            // the order they changed the map.
            let mut views = self.views.lock().await;
            if views.get(&view.key) == Some(&view) {
                return Ok(());
            }
            views.insert(view.key.clone(), view);
            self.persist(&views).await
        }
        .boxed()
    }

    fn clear_hibernated(&self, key: ViewKey) -> BoxFuture<'_, Result<(), StoreError>> {
        async move {
            let mut views = self.views.lock().await;
            if views.remove(&key).is_none() {
                return Ok(());
            }
            self.persist(&views).await
        }
        .boxed()
    }

    fn load_hibernated(&self) -> BoxFuture<'_, Result<Vec<HibernatedView>, StoreError>> {
        async move { Ok(self.views.lock().await.values().cloned().collect()) }.boxed()
    }
}
