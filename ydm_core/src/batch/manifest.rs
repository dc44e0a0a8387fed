use std::path::{Path, PathBuf};
use std::sync::Arc;

use url::Url;
use uuid::Uuid;

use crate::fs_store::FileStore;
use crate::types::types::DownloadError;

/// Transient `--batch-file` listing the batch URLs, one per line.
///
/// Removed explicitly with [`remove`](Self::remove); if the owner is dropped
/// first (panic, aborted task) the file is unlinked synchronously on drop.
pub struct BatchManifest {
    path: PathBuf,
    store: Arc<dyn FileStore>,
    removed: bool,
}

impl BatchManifest {
    pub async fn create(
        store: Arc<dyn FileStore>,
        dir: &Path,
        urls: &[Url],
    ) -> Result<Self, DownloadError> {
        let path = dir.join(format!("ydm-batch-{}.txt", Uuid::new_v4()));
        let mut text = String::new();
        for url in urls {
            text.push_str(url.as_str());
            text.push('\n');
        }
        store.write(&path, text.as_bytes()).await?;
        log::debug!("[manifest] wrote {} url(s) to {}", urls.len(), path.display());

        Ok(Self {
            path,
            store,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn remove(mut self) -> Result<(), DownloadError> {
        self.removed = true;
        self.store.remove_file(&self.path).await?;
        log::debug!("[manifest] removed {}", self.path.display());
        Ok(())
    }
}

impl Drop for BatchManifest {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                log::warn!("[manifest] failed to remove {}: {}", self.path.display(), e);
            }
            _ => {}
        }
    }
}
