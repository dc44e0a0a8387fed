use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Quality level the user asked for. Video levels degrade in the order
/// `1440p → 1080p → 720p`; audio never degrades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "audio")]
    Audio,
    #[serde(rename = "1440p")]
    P1440,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
}

impl Quality {
    pub const ALL: [Quality; 4] = [Quality::Audio, Quality::P1440, Quality::P1080, Quality::P720];

    /// Vertical resolution for video levels, `None` for audio.
    pub fn height(self) -> Option<u32> {
        match self {
            Quality::Audio => None,
            Quality::P1440 => Some(1440),
            Quality::P1080 => Some(1080),
            Quality::P720 => Some(720),
        }
    }

    /// Levels tried, in order, when this quality is requested.
    pub fn fallback_chain(self) -> &'static [Quality] {
        match self {
            Quality::Audio => &[Quality::Audio],
            Quality::P1440 => &[Quality::P1440, Quality::P1080, Quality::P720],
            Quality::P1080 => &[Quality::P1080, Quality::P720],
            Quality::P720 => &[Quality::P720],
        }
    }

    pub fn is_audio(self) -> bool {
        self == Quality::Audio
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Quality::Audio => "audio",
            Quality::P1440 => "1440p",
            Quality::P1080 => "1080p",
            Quality::P720 => "720p",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = DownloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Quality::ALL
            .into_iter()
            .find(|q| q.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DownloadError::InvalidRequest(format!("unknown quality: {}", s)))
    }
}

/// Everything needed to run one batch. Not mutated once the batch starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub urls: Vec<Url>,
    pub output_pattern: String,
    pub quality: Quality,
    pub file_format: Option<String>,
    pub subtitle_langs: Option<String>,
}

impl DownloadRequest {
    pub fn new(urls: Vec<Url>, output_pattern: impl Into<String>, quality: Quality) -> Self {
        Self {
            urls,
            output_pattern: output_pattern.into(),
            quality,
            file_format: None,
            subtitle_langs: None,
        }
    }

    /// Container/codec for the result (`mp3`, `flac`, `mkv`, ...). Blank values are ignored.
    pub fn with_file_format(mut self, format: impl Into<String>) -> Self {
        self.file_format = non_blank(format.into());
        self
    }

    /// Subtitle language prefix such as `en`. Blank values are ignored.
    pub fn with_subtitle_langs(mut self, langs: impl Into<String>) -> Self {
        self.subtitle_langs = non_blank(langs.into());
        self
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parses a newline separated URL list. Blank and unparsable lines are dropped.
pub fn parse_url_list(text: &str) -> Vec<Url> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match Url::parse(line) {
            Ok(url) => Some(url),
            Err(e) => {
                log::debug!("[parse_url_list] dropping {:?}: {}", line, e);
                None
            }
        })
        .collect()
}

/// Which part of an item's pipeline a progress event comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStage {
    /// Transfer of one of the item's streams. 100% here is not the end of the item.
    #[default]
    Download,
    /// A post-processor (merge, conversion, metadata) started or is running.
    PostProcessing,
    /// A post-processor finished.
    PostProcessed,
}

/// One structured progress update for a single URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub url: String,
    pub title: String,
    pub percentage: u8,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    pub speed_bytes_per_sec: u64,
    pub eta_seconds: u64,
    #[serde(default)]
    pub stage: ProgressStage,
}

impl ProgressEvent {
    /// True once a post-processor reported `finished` for this item.
    pub fn is_complete(&self) -> bool {
        self.stage == ProgressStage::PostProcessed
    }
}

/// Lifecycle of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchPhase {
    Idle,
    Preparing,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl BatchPhase {
    pub fn is_active(self) -> bool {
        matches!(self, BatchPhase::Preparing | BatchPhase::Running)
    }
}

/// Final accounting returned when a batch finishes without error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub phase: BatchPhase,
    pub completed: Vec<Url>,
    pub pending: Vec<Url>,
}

/// How the downloader process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitResult {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stderr: String,
}

/// yt-dlp prints this when no stream satisfies the format selector.
const FORMAT_UNAVAILABLE_MARKER: &str = "Requested format is not available";

impl ExitResult {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Maps a non-zero exit into the matching error, keeping the collected stderr.
    pub fn into_result(self) -> Result<ExitResult, DownloadError> {
        if self.success() {
            return Ok(self);
        }
        if self.stderr.contains(FORMAT_UNAVAILABLE_MARKER) {
            return Err(DownloadError::NoMatchingFormat(last_line(&self.stderr)));
        }
        Err(DownloadError::ProcessFailed {
            code: self.code,
            stderr: self.stderr,
        })
    }
}

fn last_line(text: &str) -> String {
    text.lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or_default()
        .trim()
        .to_string()
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("failed to start downloader {path}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no matching format: {0}")]
    NoMatchingFormat(String),

    #[error("downloader exited with code {code:?}: {}", last_line(.stderr))]
    ProcessFailed { code: Option<i32>, stderr: String },

    #[error("download cancelled")]
    Cancelled,

    #[error("a batch is already running")]
    BatchAlreadyRunning,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("disk error: {0}")]
    Disk(#[from] std::io::Error),

    #[error("batch task failed: {0}")]
    TaskFailed(String),
}

/// A single output line that looked like progress but could not be decoded.
/// Never fatal; the stream carries on.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed progress JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed progress line: {0}")]
    Legacy(String),
}
