use async_trait::async_trait;

use super::snapshot::BatchSnapshot;

/// Trait for anything that wants to follow a batch.
///
/// The `ProgressNotifier` calls these methods on all registered observers
/// after folding raw `ProgressEvent`s into a `BatchSnapshot`.
///
/// Lifecycle:
/// - `on_progress` is called for every event that survived de-duplication and
///   whenever an item is confirmed complete.
/// - `on_complete` is called once when the batch finishes successfully.
/// - `on_error` is called once when the batch fails or is cancelled.
#[async_trait]
pub trait BatchObserver: Send + Sync + 'static {
    /// Called with the latest aggregated snapshot after each update.
    async fn on_progress(&self, snapshot: &BatchSnapshot);

    /// Called when every item of the batch is done.
    async fn on_complete(&self, snapshot: &BatchSnapshot);

    /// Called when the batch fails or is cancelled.
    async fn on_error(&self, error: &str);
}
