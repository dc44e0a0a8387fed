use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;

use super::observer::BatchObserver;
use super::snapshot::{BatchSnapshot, ItemSnapshot};
use crate::types::types::ProgressEvent;

/// EMA smoothing factor. 0.3 = responsive but stable.
const EMA_ALPHA: f64 = 0.3;

/// What the coordinator reports to the notifier.
#[derive(Debug, Clone)]
pub enum BatchMessage {
    Progress(ProgressEvent),
    ItemCompleted(String),
}

/// Consumes `Result<BatchMessage, String>` from the coordinator, folds them into
/// `BatchSnapshot`s and fans out to all registered observers.
///
/// # Lifecycle
///
/// | Channel message          | Observer method called          |
/// |--------------------------|---------------------------------|
/// | `Ok(BatchMessage)`       | `on_progress(&snapshot)`        |
/// | `Err(String)`            | `on_error(&msg)` then stops     |
/// | Channel closed (no err)  | `on_complete(&final_snapshot)`  |
pub struct ProgressNotifier {
    observers: Vec<Arc<dyn BatchObserver>>,
    snapshot: BatchSnapshot,
    last_update: Instant,
}

impl ProgressNotifier {
    pub fn new(items_total: usize, observers: Vec<Arc<dyn BatchObserver>>) -> Self {
        Self {
            observers,
            snapshot: BatchSnapshot::empty(items_total),
            last_update: Instant::now(),
        }
    }

    /// Consume messages until the channel closes or an error arrives.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Result<BatchMessage, String>>) {
        while let Some(msg) = rx.recv().await {
            match msg {
                Ok(message) => {
                    self.handle_message(message);
                    for observer in &self.observers {
                        observer.on_progress(&self.snapshot).await;
                    }
                }
                Err(error) => {
                    for observer in &self.observers {
                        observer.on_error(&error).await;
                    }
                    return;
                }
            }
        }
        self.finish().await;
    }

    fn handle_message(&mut self, message: BatchMessage) {
        match message {
            BatchMessage::Progress(ev) => self.handle_event(ev),
            BatchMessage::ItemCompleted(url) => {
                if !self.snapshot.completed_urls.contains(&url) {
                    self.snapshot.completed_urls.push(url);
                    self.snapshot.items_completed = self.snapshot.completed_urls.len();
                }
            }
        }
    }

    fn handle_event(&mut self, ev: ProgressEvent) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.last_update = now;

        let instant_speed = ev.speed_bytes_per_sec as f64;
        let speed = match self.snapshot.current.as_ref() {
            // Same item: smooth. New item: start from the reported value.
            Some(prev) if prev.url == ev.url && elapsed > 0.0 => {
                EMA_ALPHA * instant_speed + (1.0 - EMA_ALPHA) * prev.speed
            }
            _ => instant_speed,
        };

        self.snapshot.current = Some(ItemSnapshot {
            url: ev.url,
            title: ev.title,
            percentage: ev.percentage,
            downloaded_bytes: ev.downloaded_bytes,
            total_bytes: ev.total_bytes,
            speed,
            eta_secs: ev.eta_seconds,
        });
    }

    /// Finalize: mark the snapshot as done, notify all observers.
    async fn finish(mut self) {
        self.snapshot.done = true;
        if let Some(current) = self.snapshot.current.as_mut() {
            current.eta_secs = 0;
        }
        for observer in &self.observers {
            observer.on_complete(&self.snapshot).await;
        }
    }
}
