use std::path::{Path, PathBuf};

use crate::types::types::{DownloadError, DownloadRequest, Quality};

/// Fragments fetched in parallel by the downloader for a single item.
pub const CONCURRENT_FRAGMENTS: u32 = 4;

const DEFAULT_AUDIO_FORMAT: &str = "mp3";

/// Default file name when the output pattern only names a directory.
pub const DEFAULT_FILE_TEMPLATE: &str = "%(title)s.%(ext)s";

/// One JSON object per download progress tick. Decoded by `progress::parser`.
pub const DOWNLOAD_PROGRESS_TEMPLATE: &str = concat!(
    r#"download:{"type":"download","title":%(info.title)j,"url":%(info.original_url)j,"#,
    r#""status":%(progress.status)j,"downloadedBytes":%(progress.downloaded_bytes)j,"#,
    r#""totalBytes":%(progress.total_bytes)j,"totalBytesEstimate":%(progress.total_bytes_estimate)j,"#,
    r#""eta":%(progress.eta)j,"speed":%(progress.speed)j}"#,
);

/// One JSON object per post-processor state change.
pub const POSTPROCESS_PROGRESS_TEMPLATE: &str = concat!(
    r#"postprocess:{"type":"postprocess","title":%(info.title)j,"url":%(info.original_url)j,"#,
    r#""status":%(progress.status)j}"#,
);

/// Downloader arguments for `request`, excluding the URL source.
///
/// Pure: the same request always yields the same list.
pub fn build_args(request: &DownloadRequest) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "--no-playlist".into(),
        format!("--concurrent-fragments={}", CONCURRENT_FRAGMENTS),
        "--embed-metadata".into(),
        "--embed-thumbnail".into(),
        format!("--format={}", format_selector(request.quality)),
    ];

    if request.quality.is_audio() {
        let audio_format = request
            .file_format
            .as_deref()
            .unwrap_or(DEFAULT_AUDIO_FORMAT);
        args.push("--extract-audio".into());
        args.push(format!("--audio-format={}", audio_format));
        args.push("--audio-quality=0".into());
    } else {
        if let Some(container) = request.file_format.as_deref() {
            args.push(format!("--remux-video={}", container));
        }
        if let Some(langs) = request.subtitle_langs.as_deref() {
            args.push(format!("--sub-langs={}.*", langs));
            args.push("--embed-subs".into());
        }
    }

    args.extend([
        "--quiet".into(),
        "--progress".into(),
        "--newline".into(),
        format!("--progress-template={}", DOWNLOAD_PROGRESS_TEMPLATE),
        format!("--progress-template={}", POSTPROCESS_PROGRESS_TEMPLATE),
        "--windows-filenames".into(),
        format!("--output={}", request.output_pattern),
    ]);

    args
}

/// Format selector for `quality`.
///
/// Video levels list every fallback height in order, so the downloader itself
/// degrades `1440p → 1080p → 720p` per item and reports "Requested format is
/// not available" when none of them exist.
pub fn format_selector(quality: Quality) -> String {
    if quality.is_audio() {
        return "bestaudio".to_string();
    }
    quality
        .fallback_chain()
        .iter()
        .filter_map(|q| q.height())
        .map(|h| format!("bestvideo[height={}]+bestaudio", h))
        .collect::<Vec<_>>()
        .join("/")
}

/// Turns a user output pattern into a downloader output template.
///
/// A pattern without `%(` placeholders names a directory and gets
/// [`DEFAULT_FILE_TEMPLATE`] appended. A leading `~` expands to `home`.
pub fn resolve_output_template(pattern: &str, home: Option<&Path>) -> Result<String, DownloadError> {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return Err(DownloadError::InvalidRequest(
            "output pattern is empty".to_string(),
        ));
    }

    let expanded: PathBuf = match (pattern.strip_prefix('~'), home) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with(['/', '\\']) => {
            home.join(rest.trim_start_matches(['/', '\\']))
        }
        _ => PathBuf::from(pattern),
    };

    let template = if pattern.contains("%(") {
        expanded
    } else {
        expanded.join(DEFAULT_FILE_TEMPLATE)
    };
    Ok(template.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_encodes_fallback_chain() {
        assert_eq!(format_selector(Quality::Audio), "bestaudio");
        assert_eq!(
            format_selector(Quality::P1440),
            "bestvideo[height=1440]+bestaudio/bestvideo[height=1080]+bestaudio/bestvideo[height=720]+bestaudio"
        );
        assert_eq!(
            format_selector(Quality::P720),
            "bestvideo[height=720]+bestaudio"
        );
    }

    #[test]
    fn test_directory_pattern_gets_default_file_name() {
        let resolved = resolve_output_template("/music", None).unwrap();
        assert_eq!(
            PathBuf::from(resolved),
            PathBuf::from("/music").join(DEFAULT_FILE_TEMPLATE)
        );
    }

    #[test]
    fn test_template_pattern_kept_and_home_expanded() {
        let resolved =
            resolve_output_template("~/dl/%(title)s [%(id)s].%(ext)s", Some(Path::new("/home/u")))
                .unwrap();
        assert_eq!(
            PathBuf::from(resolved),
            PathBuf::from("/home/u").join("dl/%(title)s [%(id)s].%(ext)s")
        );
    }

    #[test]
    fn test_empty_pattern_rejected() {
        assert!(matches!(
            resolve_output_template("  ", None),
            Err(DownloadError::InvalidRequest(_))
        ));
    }
}
