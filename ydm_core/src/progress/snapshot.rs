use serde::Serialize;

/// Progress of the item currently being downloaded.
#[derive(Debug, Clone, Serialize)]
pub struct ItemSnapshot {
    pub url: String,
    pub title: String,
    pub percentage: u8,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    /// Smoothed bytes per second.
    pub speed: f64,
    pub eta_secs: u64,
}

/// Aggregate view of a whole batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSnapshot {
    pub items_total: usize,
    pub items_completed: usize,
    pub completed_urls: Vec<String>,
    pub current: Option<ItemSnapshot>,
    pub done: bool,
}

impl BatchSnapshot {
    pub fn empty(items_total: usize) -> Self {
        Self {
            items_total,
            items_completed: 0,
            completed_urls: Vec::new(),
            current: None,
            done: false,
        }
    }

    /// Overall progress in percent, counting the current item fractionally.
    pub fn overall_percentage(&self) -> f64 {
        if self.items_total == 0 {
            return 0.0;
        }
        let in_flight = self
            .current
            .as_ref()
            .filter(|c| !self.completed_urls.contains(&c.url))
            .map(|c| f64::from(c.percentage) / 100.0)
            .unwrap_or(0.0);
        ((self.items_completed as f64 + in_flight) / self.items_total as f64 * 100.0).min(100.0)
    }
}

/// Human-readable byte formatting.
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;

    let b = bytes as f64;
    if b >= GB {
        format!("{:.2} GiB", b / GB)
    } else if b >= MB {
        format!("{:.2} MiB", b / MB)
    } else if b >= KB {
        format!("{:.1} KiB", b / KB)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MiB");
    }

    #[test]
    fn test_overall_percentage_counts_current_item() {
        let mut snap = BatchSnapshot::empty(4);
        snap.items_completed = 1;
        snap.completed_urls.push("a".into());
        snap.current = Some(ItemSnapshot {
            url: "b".into(),
            title: String::new(),
            percentage: 50,
            downloaded_bytes: 0,
            total_bytes: 0,
            speed: 0.0,
            eta_secs: 0,
        });
        assert!((snap.overall_percentage() - 37.5).abs() < f64::EPSILON);
        assert_eq!(BatchSnapshot::empty(0).overall_percentage(), 0.0);
    }
}
