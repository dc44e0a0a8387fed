use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::types::DownloadError;

const APP_DIR: &str = "ydm";
const PENDING_FILE: &str = "pending_urls.txt";

/// Settings shared by every batch a coordinator runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Downloader executable. Resolved by `process::locate` when unset.
    pub executable: Option<PathBuf>,
    /// ffmpeg binary or directory handed to the downloader.
    pub ffmpeg_location: Option<PathBuf>,
    /// Where the pending-URL list is persisted between runs.
    pub pending_list_path: PathBuf,
    /// Directory for transient batch manifests.
    pub manifest_dir: PathBuf,
    /// Ask the downloader for each URL's format table before starting.
    pub probe_formats: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        let data_dir = dirs_next::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(APP_DIR);
        Self {
            executable: None,
            ffmpeg_location: None,
            pending_list_path: data_dir.join(PENDING_FILE),
            manifest_dir: std::env::temp_dir(),
            probe_formats: false,
        }
    }
}

impl CoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a JSON config file. Missing keys take their defaults.
    pub async fn load(path: &Path) -> Result<Self, DownloadError> {
        let text = tokio::fs::read_to_string(path).await?;
        serde_json::from_str(&text).map_err(|e| {
            DownloadError::InvalidRequest(format!("bad config {}: {}", path.display(), e))
        })
    }

    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    pub fn with_ffmpeg_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_location = Some(path.into());
        self
    }

    pub fn with_pending_list_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.pending_list_path = path.into();
        self
    }

    pub fn with_manifest_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.manifest_dir = dir.into();
        self
    }

    pub fn with_probe_formats(mut self, probe: bool) -> Self {
        self.probe_formats = probe;
        self
    }
}
