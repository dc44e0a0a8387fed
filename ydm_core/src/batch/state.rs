use serde::Serialize;
use url::Url;

use crate::types::types::{BatchPhase, BatchReport, ProgressEvent, ProgressStage};

/// Item-level bookkeeping for one batch.
///
/// A URL only leaves `pending_urls` once a post-processor finished for it with
/// no later stage started, and the stream has moved on to another URL (or the
/// batch finished successfully). A download-stage 100% is not enough: merging
/// or conversion can still fail after it.
#[derive(Debug, Clone, Serialize)]
pub struct BatchState {
    pub phase: BatchPhase,
    pub pending_urls: Vec<Url>,
    pub completed_urls: Vec<Url>,
    pub current_url: Option<Url>,
    pub current_percentage: u8,
    /// The latest event for `current_url` was a finished post-processor.
    pub current_postprocessed: bool,
    pub cancelled: bool,
    /// Last URL string seen in the event stream, as the downloader spelled it.
    #[serde(skip)]
    last_raw_url: Option<String>,
}

impl Default for BatchState {
    fn default() -> Self {
        Self::idle()
    }
}

impl BatchState {
    pub fn idle() -> Self {
        Self {
            phase: BatchPhase::Idle,
            pending_urls: Vec::new(),
            completed_urls: Vec::new(),
            current_url: None,
            current_percentage: 0,
            current_postprocessed: false,
            cancelled: false,
            last_raw_url: None,
        }
    }

    /// Fresh state for a batch entering `Preparing`.
    pub fn preparing(urls: Vec<Url>) -> Self {
        Self {
            phase: BatchPhase::Preparing,
            pending_urls: urls,
            ..Self::idle()
        }
    }

    /// Applies one event. Returns the URL this event confirmed as complete, if any.
    pub fn apply(&mut self, event: &ProgressEvent) -> Option<Url> {
        let target = self.resolve_event(event)?;
        self.advance(target, event)
    }

    /// Like [`apply`](Self::apply), and also rewrites `event.url` to the batch
    /// URL it was attributed to, so progress and completions share one key.
    pub fn attribute(&mut self, event: &mut ProgressEvent) -> Option<Url> {
        let target = self.resolve_event(event)?;
        event.url = target.to_string();
        self.advance(target, event)
    }

    fn resolve_event(&mut self, event: &ProgressEvent) -> Option<Url> {
        let target = self.resolve(&event.url);
        if target.is_none() {
            log::warn!("[batch_state] event for unknown url {:?}", event.url);
        }
        target
    }

    fn advance(&mut self, target: Url, event: &ProgressEvent) -> Option<Url> {
        let mut confirmed = None;
        if let Some(current) = self.current_url.clone() {
            if current != target {
                if self.current_postprocessed {
                    confirmed = self.mark_complete(&current);
                }
                self.current_percentage = 0;
            }
        }

        self.current_url = Some(target);
        self.current_percentage = self.current_percentage.max(event.percentage);
        // Any later stage for the same item (another stream, the next
        // post-processor) reopens it.
        self.current_postprocessed = event.stage == ProgressStage::PostProcessed;
        confirmed
    }

    /// Moves every remaining pending URL to completed, in order.
    pub fn complete_all(&mut self) -> Vec<Url> {
        let moved: Vec<Url> = self.pending_urls.drain(..).collect();
        for url in &moved {
            if !self.completed_urls.contains(url) {
                self.completed_urls.push(url.clone());
            }
        }
        self.current_url = None;
        self.current_percentage = 0;
        self.current_postprocessed = false;
        moved
    }

    pub fn report(&self) -> BatchReport {
        BatchReport {
            phase: self.phase,
            completed: self.completed_urls.clone(),
            pending: self.pending_urls.clone(),
        }
    }

    fn mark_complete(&mut self, url: &Url) -> Option<Url> {
        let idx = self.pending_urls.iter().position(|u| u == url)?;
        let url = self.pending_urls.remove(idx);
        log::info!("[batch_state] completed {}", url);
        self.completed_urls.push(url.clone());
        Some(url)
    }

    /// Maps the URL string from an event onto one of the batch URLs.
    ///
    /// The downloader normally echoes the URL from the manifest. When it does
    /// not (redirects, canonicalisation), a new spelling is taken to mean the
    /// next pending item in manifest order.
    fn resolve(&mut self, raw: &str) -> Option<Url> {
        let raw = raw.trim();
        if raw.is_empty() {
            return self
                .current_url
                .clone()
                .or_else(|| self.pending_urls.first().cloned());
        }

        let previous_raw = self.last_raw_url.replace(raw.to_string());

        if let Ok(parsed) = Url::parse(raw) {
            if self.pending_urls.contains(&parsed) || self.completed_urls.contains(&parsed) {
                return Some(parsed);
            }
        }

        if previous_raw.as_deref() == Some(raw) {
            if let Some(current) = self.current_url.clone() {
                return Some(current);
            }
        }

        match self.current_url.as_ref() {
            None => self.pending_urls.first().cloned(),
            Some(current) => {
                let after = self
                    .pending_urls
                    .iter()
                    .position(|u| u == current)
                    .map(|i| i + 1)
                    .unwrap_or(0);
                self.pending_urls
                    .iter()
                    .skip(after)
                    .find(|u| *u != current)
                    .cloned()
            }
        }
    }
}
