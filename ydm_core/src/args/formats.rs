use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::process::supervisor::ProcessSupervisor;
use crate::types::types::{DownloadError, Quality};

/// `137  mp4   1920x1080  25 | ...` or `251  webm  audio only  2 | ...`
static FORMAT_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<id>[\w-]+)\s+(?P<ext>\w+)\s+(?P<res>audio only|\d+x\d+)(?:\s|$)")
        .expect("format row regex")
});

/// One row of `--list-formats` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFormat {
    pub id: String,
    pub ext: String,
    pub resolution: String,
    pub height: Option<u32>,
}

/// Formats available for one URL, in the downloader's order (worst → best).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatTable {
    pub video: Vec<MediaFormat>,
    pub audio_only: Vec<MediaFormat>,
}

impl FormatTable {
    /// Parses the table printed by `--list-formats`. Header, separator and
    /// info lines do not match a row and are skipped.
    pub fn parse(output: &str) -> Self {
        let mut table = FormatTable::default();
        for caps in output.lines().filter_map(|l| FORMAT_ROW.captures(l.trim())) {
            // Storyboards are thumbnails, not media.
            if &caps["ext"] == "mhtml" {
                continue;
            }
            let resolution = caps["res"].to_string();
            let height = resolution
                .split_once('x')
                .and_then(|(_, h)| h.parse::<u32>().ok());
            let format = MediaFormat {
                id: caps["id"].to_string(),
                ext: caps["ext"].to_string(),
                resolution,
                height,
            };
            if format.height.is_some() {
                table.video.push(format);
            } else {
                table.audio_only.push(format);
            }
        }
        table
    }

    pub fn has_height(&self, height: u32) -> bool {
        self.video.iter().any(|f| f.height == Some(height))
    }

    /// Best (last listed) video format at exactly `height`.
    pub fn best_video(&self, height: u32) -> Option<&MediaFormat> {
        self.video.iter().rev().find(|f| f.height == Some(height))
    }

    pub fn best_audio(&self) -> Option<&MediaFormat> {
        self.audio_only.last()
    }
}

/// Walks `requested`'s fallback chain and returns the first level the table can
/// satisfy.
pub fn resolve_quality(requested: Quality, table: &FormatTable) -> Result<Quality, DownloadError> {
    if requested.is_audio() {
        return table
            .best_audio()
            .map(|_| Quality::Audio)
            .ok_or_else(|| DownloadError::NoMatchingFormat("no audio-only stream".to_string()));
    }

    requested
        .fallback_chain()
        .iter()
        .copied()
        .find(|q| q.height().is_some_and(|h| table.has_height(h)))
        .ok_or_else(|| {
            DownloadError::NoMatchingFormat(format!(
                "no video stream at {} or any lower fallback",
                requested
            ))
        })
}

/// Runs `--list-formats` for one URL and parses the result.
pub async fn probe_formats(
    supervisor: &ProcessSupervisor,
    url: &Url,
    extra_args: &[String],
    cancel: &CancellationToken,
) -> Result<FormatTable, DownloadError> {
    let mut args: Vec<String> = vec![
        "--no-playlist".into(),
        "--quiet".into(),
        "--list-formats".into(),
    ];
    args.extend(extra_args.iter().cloned());
    args.push(url.to_string());

    let stdout = Arc::new(Mutex::new(String::new()));
    let sink = Arc::clone(&stdout);

    let mut process = supervisor.spawn(&args, cancel).await?;
    process.on_stdout_line(move |line| {
        if let Ok(mut buf) = sink.lock() {
            buf.push_str(line);
            buf.push('\n');
        }
    });
    process.wait().await?.into_result()?;

    let output = stdout.lock().map(|s| s.clone()).unwrap_or_default();
    let table = FormatTable::parse(&output);
    log::debug!(
        "[formats] {}: {} video, {} audio-only formats",
        url,
        table.video.len(),
        table.audio_only.len()
    );
    Ok(table)
}
