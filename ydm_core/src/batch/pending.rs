use std::path::{Path, PathBuf};
use std::sync::Arc;

use url::Url;

use crate::fs_store::FileStore;
use crate::types::types::{parse_url_list, DownloadError};

/// URLs not yet confirmed downloaded, persisted one per line so an interrupted
/// batch can be resumed.
#[derive(Clone)]
pub struct PendingList {
    path: PathBuf,
    store: Arc<dyn FileStore>,
}

impl PendingList {
    pub fn new(path: impl Into<PathBuf>, store: Arc<dyn FileStore>) -> Self {
        Self {
            path: path.into(),
            store,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the persisted list. A missing file is an empty list.
    pub async fn load(&self) -> Result<Vec<Url>, DownloadError> {
        if !self.store.path_exists(&self.path).await {
            return Ok(Vec::new());
        }
        let text = self.store.read_to_string(&self.path).await?;
        Ok(parse_url_list(&text))
    }

    /// Replaces the persisted list. An empty list removes the file.
    pub async fn save(&self, urls: &[Url]) -> Result<(), DownloadError> {
        if urls.is_empty() {
            return self.clear().await;
        }
        let mut text = String::new();
        for url in urls {
            text.push_str(url.as_str());
            text.push('\n');
        }
        self.store.write(&self.path, text.as_bytes()).await?;
        log::debug!(
            "[pending] {} url(s) written to {}",
            urls.len(),
            self.path.display()
        );
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), DownloadError> {
        self.store.remove_file(&self.path).await?;
        log::debug!("[pending] cleared {}", self.path.display());
        Ok(())
    }
}

impl std::fmt::Debug for PendingList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingList").field("path", &self.path).finish()
    }
}
