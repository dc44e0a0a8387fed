use async_trait::async_trait;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::Mutex;

use ydm_core::progress::{format_bytes, BatchObserver, BatchSnapshot};

/// Renders batch progress as two indicatif bars: the current item on top,
/// the whole batch (items done / total) below it.
pub struct TerminalBatchObserver {
    multi: MultiProgress,
    item_bar: ProgressBar,
    batch_bar: ProgressBar,
    /// URL the item bar currently shows.
    current_url: Mutex<Option<String>>,
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-")
}

impl TerminalBatchObserver {
    pub fn new(items_total: usize) -> Self {
        let multi = MultiProgress::new();

        let item_bar = multi.add(ProgressBar::new(100));
        item_bar.set_style(style("[{bar:30.cyan/blue}] {pos:>3}% {msg}"));

        let batch_bar = multi.add(ProgressBar::new(items_total as u64));
        batch_bar.set_style(style("Batch [{bar:30.green/white}] {pos}/{len} items"));

        Self {
            multi,
            item_bar,
            batch_bar,
            current_url: Mutex::new(None),
        }
    }

    /// Prints a line above the bars without tearing them.
    pub fn println(&self, line: impl AsRef<str>) {
        let _ = self.multi.println(line);
    }

    fn render(&self, snapshot: &BatchSnapshot) {
        self.batch_bar.set_length(snapshot.items_total as u64);
        self.batch_bar.set_position(snapshot.items_completed as u64);

        let Some(item) = snapshot.current.as_ref() else {
            return;
        };

        if let Ok(mut current) = self.current_url.lock() {
            if current.as_deref() != Some(item.url.as_str()) {
                // New item: restart the bar instead of showing it going backwards.
                self.item_bar.reset();
                *current = Some(item.url.clone());
            }
        }

        let name = if item.title.is_empty() {
            item.url.as_str()
        } else {
            item.title.as_str()
        };
        let detail = if item.total_bytes > 0 {
            format!(
                "{} / {} at {}/s ETA {}s",
                format_bytes(item.downloaded_bytes),
                format_bytes(item.total_bytes),
                format_bytes(item.speed as u64),
                item.eta_secs
            )
        } else {
            String::new()
        };

        self.item_bar.set_position(u64::from(item.percentage));
        self.item_bar.set_message(format!("{} {}", name, detail));
    }
}

#[async_trait]
impl BatchObserver for TerminalBatchObserver {
    async fn on_progress(&self, snapshot: &BatchSnapshot) {
        self.render(snapshot);
    }

    async fn on_complete(&self, snapshot: &BatchSnapshot) {
        self.render(snapshot);
        self.item_bar.finish_and_clear();
        self.batch_bar.finish_with_message(format!(
            "Complete: {} of {} items",
            snapshot.items_completed, snapshot.items_total
        ));
    }

    async fn on_error(&self, error: &str) {
        self.item_bar.abandon_with_message(format!("Error: {}", error));
        self.batch_bar.abandon();
    }
}
