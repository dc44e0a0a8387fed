use std::path::{Path, PathBuf};

use crate::config::CoreConfig;

const DOWNLOADER: &str = "yt-dlp";
const FFMPEG: &str = "ffmpeg";
const APP_DIR: &str = "ydm";

/// Where to look for the downloader and ffmpeg binaries.
///
/// Packaged builds ship both as sidecars next to the main executable. Inside an
/// AppImage the bundle is read-only, so a user-local copy takes precedence once
/// it exists.
#[derive(Debug, Clone, Default)]
pub struct Locator {
    pub appimage: bool,
    pub home_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub exe_dir: Option<PathBuf>,
}

impl Locator {
    pub fn from_env() -> Self {
        Self {
            appimage: std::env::var_os("APPIMAGE").is_some(),
            home_dir: dirs_next::home_dir(),
            cache_dir: dirs_next::cache_dir().map(|d| d.join(APP_DIR)),
            exe_dir: std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf)),
        }
    }

    /// Explicit path, then the user-local install (AppImage only), then the
    /// bundled sidecar, then whatever `yt-dlp` resolves to on `PATH`.
    pub fn downloader(&self, config: &CoreConfig) -> PathBuf {
        if let Some(path) = config.executable.as_ref() {
            return path.clone();
        }
        if self.appimage {
            if let Some(local) = self
                .home_dir
                .as_ref()
                .map(|home| home.join(".local").join("bin").join(DOWNLOADER))
                .filter(|p| p.is_file())
            {
                return local;
            }
        }
        self.sidecar(DOWNLOADER)
            .unwrap_or_else(|| PathBuf::from(binary_name(DOWNLOADER)))
    }

    /// Explicit path, then the AppImage cache copy, then the bundled sidecar.
    /// `None` lets the downloader search `PATH` itself.
    pub fn ffmpeg(&self, config: &CoreConfig) -> Option<PathBuf> {
        if let Some(path) = config.ffmpeg_location.as_ref() {
            return Some(path.clone());
        }
        if self.appimage {
            if let Some(cached) = self
                .cache_dir
                .as_ref()
                .map(|dir| dir.join(binary_name(FFMPEG)))
                .filter(|p| p.is_file())
            {
                return Some(cached);
            }
        }
        self.sidecar(FFMPEG)
    }

    fn sidecar(&self, name: &str) -> Option<PathBuf> {
        self.exe_dir
            .as_ref()
            .map(|dir| dir.join(binary_name(name)))
            .filter(|p| p.is_file())
    }
}

fn binary_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", name)
    } else {
        name.to_string()
    }
}
