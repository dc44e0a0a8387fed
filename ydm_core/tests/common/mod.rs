#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use ydm_core::config::CoreConfig;
use ydm_core::progress::{BatchObserver, BatchSnapshot};

/// Shell prelude shared by every fake downloader: finds the manifest and
/// defines helpers printing lines in the progress-template layout.
const PRELUDE: &str = r#"#!/bin/sh
batch=""
for arg in "$@"; do
  case "$arg" in
    --batch-file=*) batch="${arg#--batch-file=}" ;;
  esac
done
progress() {
  printf '{"type":"download","title":"Video","url":"%s","status":"%s","downloadedBytes":%s,"totalBytes":100,"totalBytesEstimate":null,"eta":1,"speed":2048}\n' "$1" "$3" "$2"
}
finished() {
  printf '{"type":"postprocess","title":"Video","url":"%s","status":"finished"}\n' "$1"
}
"#;

/// Writes an executable stand-in for yt-dlp into `dir`.
pub fn fake_downloader(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-yt-dlp");
    std::fs::write(&path, format!("{}{}\n", PRELUDE, body)).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

pub fn test_config(dir: &Path, executable: &Path) -> CoreConfig {
    CoreConfig::new()
        .with_executable(executable)
        .with_pending_list_path(dir.join("pending_urls.txt"))
        .with_manifest_dir(dir.join("manifests"))
}

pub fn urls(n: usize) -> Vec<Url> {
    (1..=n)
        .map(|i| Url::parse(&format!("https://example.com/v/{}", i)).unwrap())
        .collect()
}

/// Files left in the manifest directory (missing directory counts as empty).
pub fn manifest_count(dir: &Path) -> usize {
    std::fs::read_dir(dir.join("manifests"))
        .map(|entries| entries.count())
        .unwrap_or(0)
}

pub fn read_pending(dir: &Path) -> Option<String> {
    std::fs::read_to_string(dir.join("pending_urls.txt")).ok()
}

/// `kill -0` succeeds while the process exists.
pub fn is_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Polls `condition` every 20ms until it holds or `timeout` passes.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

/// Observer that records everything it is told.
#[derive(Default)]
pub struct RecordingObserver {
    pub progress: Mutex<Vec<BatchSnapshot>>,
    pub completed: Mutex<Option<BatchSnapshot>>,
    pub errors: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn progress_count(&self) -> usize {
        self.progress.lock().unwrap().len()
    }
}

#[async_trait]
impl BatchObserver for RecordingObserver {
    async fn on_progress(&self, snapshot: &BatchSnapshot) {
        self.progress.lock().unwrap().push(snapshot.clone());
    }

    async fn on_complete(&self, snapshot: &BatchSnapshot) {
        *self.completed.lock().unwrap() = Some(snapshot.clone());
    }

    async fn on_error(&self, error: &str) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}
