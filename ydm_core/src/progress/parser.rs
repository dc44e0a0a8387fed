use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::types::types::{ParseError, ProgressEvent, ProgressStage};

/// `[download]  42.5% of ~ 10.00MiB at  1.20MiB/s ETA 00:07`
/// `[download] 100% of   10.00MiB in 00:00:05 at 2.00MiB/s`
static LEGACY_PROGRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\[download\]\s+(?P<pct>\d+(?:\.\d+)?)%\s+of\s+~?\s*(?P<total>\S+)(?:\s+in\s+\S+)?(?:\s+at\s+(?P<speed>\S+))?(?:\s+ETA\s+(?P<eta>\S+))?",
    )
    .expect("legacy progress regex")
});

/// `[youtube] Extracting URL: https://...` marks the start of a new item.
static EXTRACTING_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[[^\]]+\]\s+Extracting URL:\s+(?P<url>\S+)").expect("extracting url regex")
});

static SIZE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<num>\d+(?:\.\d+)?)(?P<unit>[KMGTP]?i?B)(?:/s)?$").expect("size regex")
});

/// Raw fields decoded from one progress line, before URL attribution and de-duplication.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawProgress {
    pub url: Option<String>,
    pub title: Option<String>,
    pub percentage: u8,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    pub speed_bytes_per_sec: u64,
    pub eta_seconds: u64,
    pub stage: ProgressStage,
    /// The line carried a terminal status (`finished`) for its stage.
    pub finished: bool,
}

/// Structural classification of one output line.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressLine {
    Json(RawProgress),
    LegacyText(RawProgress),
    /// Not progress. Carries the item URL when the line announces a new one.
    Unrecognized { url_hint: Option<String> },
}

/// Shape written by the `--progress-template` strings built in `format_builder`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TemplateLine {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    title: Value,
    #[serde(default)]
    url: Value,
    #[serde(default)]
    status: Value,
    #[serde(default)]
    percentage: Value,
    #[serde(default)]
    downloaded_bytes: Value,
    #[serde(default)]
    total_bytes: Value,
    #[serde(default)]
    total_bytes_estimate: Value,
    #[serde(default)]
    eta: Value,
    #[serde(default)]
    speed: Value,
}

/// Classifies a single line. JSON is tried first, then the legacy text layout.
pub fn classify(line: &str) -> Result<ProgressLine, ParseError> {
    let line = line.trim();

    if line.starts_with('{') {
        let parsed: TemplateLine = serde_json::from_str(line)?;
        return Ok(match template_to_raw(parsed) {
            Some(raw) => ProgressLine::Json(raw),
            None => ProgressLine::Unrecognized { url_hint: None },
        });
    }

    if let Some(caps) = LEGACY_PROGRESS.captures(line) {
        let pct: f64 = caps["pct"]
            .parse()
            .map_err(|_| ParseError::Legacy(line.to_string()))?;
        let percentage = clamp_percentage(pct);
        let total_bytes = parse_size(&caps["total"]);
        let downloaded_bytes = ((total_bytes as f64) * f64::from(percentage) / 100.0).floor() as u64;
        let speed_bytes_per_sec = caps.name("speed").map(|m| parse_size(m.as_str())).unwrap_or(0);
        let eta_seconds = caps.name("eta").map(|m| parse_eta(m.as_str())).unwrap_or(0);

        return Ok(ProgressLine::LegacyText(RawProgress {
            url: None,
            title: None,
            percentage,
            downloaded_bytes,
            total_bytes,
            speed_bytes_per_sec,
            eta_seconds,
            stage: ProgressStage::Download,
            finished: percentage >= 100,
        }));
    }

    let url_hint = EXTRACTING_URL
        .captures(line)
        .map(|caps| caps["url"].to_string());
    Ok(ProgressLine::Unrecognized { url_hint })
}

fn template_to_raw(line: TemplateLine) -> Option<RawProgress> {
    let status = text_field(&line.status).unwrap_or_default();
    let url = text_field(&line.url);
    let title = text_field(&line.title);

    match line.kind.as_str() {
        "download" => {
            let downloaded_bytes = number_field(&line.downloaded_bytes);
            let total_bytes = match number_field(&line.total_bytes) {
                0 => number_field(&line.total_bytes_estimate),
                n => n,
            };
            let finished = status == "finished";
            let percentage = if finished {
                100
            } else if let Some(pct) = float_field(&line.percentage) {
                clamp_percentage(pct)
            } else {
                percentage_of(downloaded_bytes, total_bytes)
            };
            Some(RawProgress {
                url,
                title,
                percentage,
                downloaded_bytes,
                total_bytes,
                speed_bytes_per_sec: number_field(&line.speed),
                eta_seconds: number_field(&line.eta),
                stage: ProgressStage::Download,
                finished,
            })
        }
        // Post-processors only run once every stream is on disk, so the
        // transfer itself is at 100 for all of their lines.
        "postprocess" => {
            let finished = status == "finished";
            Some(RawProgress {
                url,
                title,
                percentage: 100,
                stage: if finished {
                    ProgressStage::PostProcessed
                } else {
                    ProgressStage::PostProcessing
                },
                finished,
                ..RawProgress::default()
            })
        }
        _ => None,
    }
}

/// `floor(downloaded / total * 100)`, 0 when the total is unknown.
pub fn percentage_of(downloaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    clamp_percentage((downloaded as f64 / total as f64 * 100.0).floor())
}

fn clamp_percentage(pct: f64) -> u8 {
    if pct.is_nan() || pct <= 0.0 {
        0
    } else {
        pct.floor().min(100.0) as u8
    }
}

/// Strings that yt-dlp emits when a field is not available.
fn is_sentinel(s: &str) -> bool {
    matches!(s.trim(), "" | "NA" | "N/A" | "Unknown" | "None" | "null")
}

fn text_field(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !is_sentinel(s) => Some(s.clone()),
        _ => None,
    }
}

fn float_field(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if !is_sentinel(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }
}

fn number_field(value: &Value) -> u64 {
    float_field(value)
        .filter(|v| v.is_finite() && *v > 0.0)
        .map(|v| v.floor() as u64)
        .unwrap_or(0)
}

/// `10.00MiB`, `1.2KiB/s`, `512B` → bytes. Sentinels and garbage → 0.
fn parse_size(text: &str) -> u64 {
    let Some(caps) = SIZE.captures(text.trim()) else {
        return 0;
    };
    let num: f64 = caps["num"].parse().unwrap_or(0.0);
    let unit = &caps["unit"];
    let binary = unit.contains('i');
    let base: f64 = if binary { 1024.0 } else { 1000.0 };
    let exp = match unit.chars().next() {
        Some('K') => 1,
        Some('M') => 2,
        Some('G') => 3,
        Some('T') => 4,
        Some('P') => 5,
        _ => 0,
    };
    (num * base.powi(exp)).floor() as u64
}

/// `SS`, `MM:SS` or `HH:MM:SS` → seconds. Sentinels → 0.
fn parse_eta(text: &str) -> u64 {
    if is_sentinel(text) {
        return 0;
    }
    text.split(':')
        .map(|part| part.trim().parse::<u64>())
        .try_fold(0u64, |acc, part| part.map(|p| acc * 60 + p))
        .unwrap_or(0)
}

/// Stateful front end over [`classify`]: attributes legacy lines to the current item
/// and suppresses updates that do not advance the per-URL percentage.
///
/// An event passes when it is the first for its URL, when it reports 100%, or when it
/// is at least one point above the last emitted percentage for that URL. Post-processing
/// lines always report 100% and therefore always pass.
#[derive(Debug, Default)]
pub struct ProgressParser {
    current_url: Option<String>,
    current_title: Option<String>,
    last_emitted: HashMap<String, u8>,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// URL used for legacy lines until the output itself names one.
    pub fn set_url_hint(&mut self, url: impl Into<String>) {
        let url = url.into();
        if self.current_url.as_deref() != Some(url.as_str()) {
            self.current_title = None;
        }
        self.current_url = Some(url);
    }

    pub fn current_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    /// Feeds one line. `Ok(None)` means nothing worth reporting.
    pub fn feed(&mut self, line: &str) -> Result<Option<ProgressEvent>, ParseError> {
        let raw = match classify(line)? {
            ProgressLine::Json(raw) | ProgressLine::LegacyText(raw) => raw,
            ProgressLine::Unrecognized { url_hint } => {
                if let Some(url) = url_hint {
                    self.set_url_hint(url);
                }
                log::trace!("[progress_parser] ignoring line: {}", line);
                return Ok(None);
            }
        };

        if let Some(url) = raw.url.as_ref() {
            self.set_url_hint(url.clone());
        }
        if let Some(title) = raw.title.as_ref() {
            self.current_title = Some(title.clone());
        }
        let url = self.current_url.clone().unwrap_or_default();

        let forced = raw.finished || raw.percentage >= 100;
        match self.last_emitted.get(&url) {
            Some(&last) if !forced && raw.percentage < last.saturating_add(1) => {
                return Ok(None);
            }
            _ => {}
        }
        let last = self.last_emitted.entry(url.clone()).or_insert(0);
        *last = (*last).max(raw.percentage);

        Ok(Some(ProgressEvent {
            url,
            title: self.current_title.clone().unwrap_or_default(),
            percentage: raw.percentage,
            downloaded_bytes: raw.downloaded_bytes,
            total_bytes: raw.total_bytes,
            speed_bytes_per_sec: raw.speed_bytes_per_sec,
            eta_seconds: raw.eta_seconds,
            stage: raw.stage,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size_units() {
        assert_eq!(parse_size("512B"), 512);
        assert_eq!(parse_size("1.00KiB"), 1024);
        assert_eq!(parse_size("2.50MiB"), 2_621_440);
        assert_eq!(parse_size("1.00MiB/s"), 1_048_576);
        assert_eq!(parse_size("3MB"), 3_000_000);
        assert_eq!(parse_size("Unknown"), 0);
        assert_eq!(parse_size("N/A"), 0);
    }

    #[test]
    fn test_parse_eta_forms() {
        assert_eq!(parse_eta("07"), 7);
        assert_eq!(parse_eta("01:05"), 65);
        assert_eq!(parse_eta("01:00:01"), 3601);
        assert_eq!(parse_eta("Unknown"), 0);
        assert_eq!(parse_eta("NA"), 0);
        assert_eq!(parse_eta("xx:01"), 0);
    }

    #[test]
    fn test_number_field_sentinels() {
        assert_eq!(number_field(&Value::Null), 0);
        assert_eq!(number_field(&Value::String("NA".into())), 0);
        assert_eq!(number_field(&serde_json::json!(1234.9)), 1234);
        assert_eq!(number_field(&serde_json::json!("42")), 42);
        assert_eq!(number_field(&serde_json::json!(-3)), 0);
    }
}
