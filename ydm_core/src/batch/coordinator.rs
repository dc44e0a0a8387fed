use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::args::format_builder::{build_args, resolve_output_template};
use crate::args::formats::{probe_formats, resolve_quality};
use crate::batch::manifest::BatchManifest;
use crate::batch::pending::PendingList;
use crate::batch::state::BatchState;
use crate::config::CoreConfig;
use crate::fs_store::{FileStore, LocalFileStore};
use crate::process::locate::Locator;
use crate::process::supervisor::{ProcessSupervisor, SupervisedProcess};
use crate::progress::notifier::{BatchMessage, ProgressNotifier};
use crate::progress::observer::BatchObserver;
use crate::progress::parser::ProgressParser;
use crate::types::types::{
    BatchPhase, BatchReport, DownloadError, DownloadRequest, ExitResult, ProgressEvent,
};

const MESSAGE_CHANNEL_SIZE: usize = 256;

// ---------------------------------------------------------------------------
// BatchCoordinator
// ---------------------------------------------------------------------------

/// Drives one batch at a time through a single downloader process.
///
/// Progress reaches callers two ways: registered [`BatchObserver`]s, and the
/// polled [`state`](Self::state). Completed URLs are pruned from the persisted
/// pending list as soon as they are confirmed, so an interrupted batch can be
/// restarted from whatever is left.
pub struct BatchCoordinator {
    config: CoreConfig,
    locator: Locator,
    store: Arc<dyn FileStore>,
    pending: PendingList,
    observers: Vec<Arc<dyn BatchObserver>>,
    state: Arc<RwLock<BatchState>>,
    running: Arc<AtomicBool>,
}

/// Everything `Preparing` produces for `Running`.
struct PreparedBatch {
    urls: Vec<Url>,
    supervisor: ProcessSupervisor,
    args: Vec<String>,
    manifest: BatchManifest,
}

impl BatchCoordinator {
    pub fn new(config: CoreConfig) -> Self {
        let store: Arc<dyn FileStore> = Arc::new(LocalFileStore);
        let pending = PendingList::new(config.pending_list_path.clone(), Arc::clone(&store));
        Self {
            config,
            locator: Locator::from_env(),
            store,
            pending,
            observers: Vec::new(),
            state: Arc::new(RwLock::new(BatchState::idle())),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn FileStore>) -> Self {
        self.pending = PendingList::new(self.config.pending_list_path.clone(), Arc::clone(&store));
        self.store = store;
        self
    }

    pub fn with_locator(mut self, locator: Locator) -> Self {
        self.locator = locator;
        self
    }

    /// Register an observer. Applies to batches started afterwards.
    pub fn add_observer(&mut self, observer: Arc<dyn BatchObserver>) {
        self.observers.push(observer);
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn pending_list(&self) -> &PendingList {
        &self.pending
    }

    /// Copy of the current batch state.
    pub fn state(&self) -> BatchState {
        match self.state.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn phase(&self) -> BatchPhase {
        self.state().phase
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Starts `request` on a background task.
    ///
    /// Fails immediately with `BatchAlreadyRunning` when another batch is
    /// active; every other outcome is reported through the handle.
    pub fn start(self: &Arc<Self>, request: DownloadRequest) -> Result<BatchHandle, DownloadError> {
        let guard = self.claim()?;
        let cancel = CancellationToken::new();
        let this = Arc::clone(self);
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            this.execute(request, token).await
        });
        Ok(BatchHandle { cancel, task })
    }

    /// Runs `request` to completion on the current task.
    pub async fn run(
        &self,
        request: DownloadRequest,
        cancel: CancellationToken,
    ) -> Result<BatchReport, DownloadError> {
        let _guard = self.claim()?;
        self.execute(request, cancel).await
    }

    fn claim(&self) -> Result<RunningGuard, DownloadError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::warn!("[coordinator] rejected start: a batch is already running");
            return Err(DownloadError::BatchAlreadyRunning);
        }
        *self.write_state() = BatchState::preparing(Vec::new());
        Ok(RunningGuard {
            running: Arc::clone(&self.running),
        })
    }

    async fn execute(
        &self,
        request: DownloadRequest,
        cancel: CancellationToken,
    ) -> Result<BatchReport, DownloadError> {
        let prepared = match self.prepare(&request, &cancel).await {
            Ok(prepared) => prepared,
            Err(e) => return Err(self.abort_prepare(e, &request).await),
        };
        let PreparedBatch {
            urls,
            supervisor,
            args,
            manifest,
        } = prepared;

        let process = match supervisor.spawn(&args, &cancel).await {
            Ok(process) => process,
            Err(e) => {
                if let Err(rm) = manifest.remove().await {
                    log::warn!("[coordinator] manifest cleanup failed: {}", rm);
                }
                return Err(self.abort_prepare(e, &request).await);
            }
        };
        log::info!(
            "[coordinator] running {} url(s), pid {:?}",
            urls.len(),
            process.id()
        );
        self.write_state().phase = BatchPhase::Running;

        let (tx, rx) = mpsc::channel(MESSAGE_CHANNEL_SIZE);
        let notifier = ProgressNotifier::new(urls.len(), self.observers.clone());
        let notifier_handle = tokio::spawn(notifier.run(rx));

        let outcome = self.consume(process, &urls, &tx).await;
        let result = self.finish(outcome, &tx).await;

        // Closing the channel lets the notifier call on_complete and exit.
        drop(tx);
        if let Err(e) = notifier_handle.await {
            log::warn!("[coordinator] notifier task failed: {}", e);
        }
        if let Err(e) = manifest.remove().await {
            log::warn!("[coordinator] manifest cleanup failed: {}", e);
        }

        result
    }

    /// Validation, template resolution, optional probing, then the pending list
    /// and manifest. Nothing is spawned for the batch itself yet.
    async fn prepare(
        &self,
        request: &DownloadRequest,
        cancel: &CancellationToken,
    ) -> Result<PreparedBatch, DownloadError> {
        let urls = validate_urls(&request.urls)?;
        self.write_state().pending_urls = urls.clone();

        let template = resolve_output_template(
            &request.output_pattern,
            dirs_next::home_dir().as_deref(),
        )?;

        let supervisor = ProcessSupervisor::new(self.locator.downloader(&self.config));
        let mut extra_args = Vec::new();
        if let Some(ffmpeg) = self.locator.ffmpeg(&self.config) {
            extra_args.push(format!("--ffmpeg-location={}", ffmpeg.display()));
        }

        if self.config.probe_formats {
            for url in &urls {
                let table = probe_formats(&supervisor, url, &extra_args, cancel).await?;
                let resolved = resolve_quality(request.quality, &table)?;
                if resolved != request.quality {
                    log::info!(
                        "[coordinator] {} falls back from {} to {}",
                        url,
                        request.quality,
                        resolved
                    );
                }
            }
        }

        self.pending.save(&urls).await?;
        let manifest =
            BatchManifest::create(Arc::clone(&self.store), &self.config.manifest_dir, &urls)
                .await?;

        let resolved = DownloadRequest {
            urls: urls.clone(),
            output_pattern: template,
            ..request.clone()
        };
        let mut args = build_args(&resolved);
        args.extend(extra_args);
        args.push(format!("--batch-file={}", manifest.path().display()));

        Ok(PreparedBatch {
            urls,
            supervisor,
            args,
            manifest,
        })
    }

    /// A batch that never reached `Running` goes back to `Idle`, unless it was
    /// cancelled, in which case its URLs are kept as pending.
    async fn abort_prepare(&self, error: DownloadError, request: &DownloadRequest) -> DownloadError {
        if matches!(error, DownloadError::Cancelled) {
            let pending = {
                let mut state = self.write_state();
                state.phase = BatchPhase::Cancelled;
                state.cancelled = true;
                state.pending_urls.clone()
            };
            let pending = if pending.is_empty() {
                validate_urls(&request.urls).unwrap_or_default()
            } else {
                pending
            };
            if let Err(e) = self.pending.save(&pending).await {
                log::warn!("[coordinator] could not persist pending list: {}", e);
            }
            log::info!("[coordinator] batch cancelled before start");
        } else {
            log::warn!("[coordinator] batch not started: {}", error);
            *self.write_state() = BatchState::idle();
        }
        error
    }

    /// Feeds every output line through the parser until the process exits or
    /// is cancelled.
    async fn consume(
        &self,
        mut process: SupervisedProcess,
        urls: &[Url],
        tx: &mpsc::Sender<Result<BatchMessage, String>>,
    ) -> Result<ExitResult, DownloadError> {
        let mut parser = ProgressParser::new();
        if let Some(first) = urls.first() {
            parser.set_url_hint(first.as_str());
        }

        while let Some(line) = process.next_line().await {
            match parser.feed(line.text()) {
                Ok(Some(event)) => self.handle_event(event, tx).await,
                Ok(None) => {}
                Err(e) => log::debug!("[coordinator] skipping line: {}", e),
            }
        }

        process.wait().await.and_then(ExitResult::into_result)
    }

    async fn handle_event(
        &self,
        mut event: ProgressEvent,
        tx: &mpsc::Sender<Result<BatchMessage, String>>,
    ) {
        let (confirmed, pending) = {
            let mut state = self.write_state();
            let confirmed = state.attribute(&mut event);
            (confirmed, state.pending_urls.clone())
        };

        if let Some(url) = confirmed {
            if let Err(e) = self.pending.save(&pending).await {
                log::warn!("[coordinator] could not persist pending list: {}", e);
            }
            let _ = tx.send(Ok(BatchMessage::ItemCompleted(url.to_string()))).await;
        }
        let _ = tx.send(Ok(BatchMessage::Progress(event))).await;
    }

    /// Settles the final phase and the persisted pending list.
    async fn finish(
        &self,
        outcome: Result<ExitResult, DownloadError>,
        tx: &mpsc::Sender<Result<BatchMessage, String>>,
    ) -> Result<BatchReport, DownloadError> {
        match outcome {
            Ok(_) => {
                // The list must be gone before the batch may report Completed.
                if let Err(error) = self.pending.clear().await {
                    log::error!("[coordinator] could not clear pending list: {}", error);
                    self.write_state().phase = BatchPhase::Failed;
                    let _ = tx.send(Err(error.to_string())).await;
                    return Err(error);
                }
                let (moved, report) = {
                    let mut state = self.write_state();
                    let moved = state.complete_all();
                    state.phase = BatchPhase::Completed;
                    (moved, state.report())
                };
                for url in moved {
                    let _ = tx.send(Ok(BatchMessage::ItemCompleted(url.to_string()))).await;
                }
                log::info!(
                    "[coordinator] batch completed: {} url(s)",
                    report.completed.len()
                );
                Ok(report)
            }
            Err(error) => {
                let pending = {
                    let mut state = self.write_state();
                    if matches!(error, DownloadError::Cancelled) {
                        state.phase = BatchPhase::Cancelled;
                        state.cancelled = true;
                    } else {
                        state.phase = BatchPhase::Failed;
                    }
                    state.pending_urls.clone()
                };
                log::info!(
                    "[coordinator] batch ended ({}), {} url(s) still pending",
                    error,
                    pending.len()
                );
                let _ = tx.send(Err(error.to_string())).await;
                self.pending.save(&pending).await?;
                Err(error)
            }
        }
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, BatchState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Keeps only http(s) URLs, first occurrence wins.
fn validate_urls(urls: &[Url]) -> Result<Vec<Url>, DownloadError> {
    let mut seen = HashSet::new();
    let valid: Vec<Url> = urls
        .iter()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .filter(|u| seen.insert(u.as_str().to_string()))
        .cloned()
        .collect();

    if valid.is_empty() {
        return Err(DownloadError::InvalidRequest(
            "no http(s) URLs to download".to_string(),
        ));
    }
    if valid.len() != urls.len() {
        log::debug!(
            "[coordinator] dropped {} invalid or duplicate url(s)",
            urls.len() - valid.len()
        );
    }
    Ok(valid)
}

/// Clears the running flag when the batch task ends, however it ends.
struct RunningGuard {
    running: Arc<AtomicBool>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// BatchHandle
// ---------------------------------------------------------------------------

/// Handle to a batch started with [`BatchCoordinator::start`].
pub struct BatchHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<BatchReport, DownloadError>>,
}

impl BatchHandle {
    /// Token that cancels this batch. Clones can be handed to signal handlers.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancels the batch and waits for teardown. When this returns the
    /// downloader is dead, the manifest is gone and observers are done.
    pub async fn cancel(self) -> Result<BatchReport, DownloadError> {
        self.cancel.cancel();
        self.wait().await
    }

    pub async fn wait(self) -> Result<BatchReport, DownloadError> {
        self.task
            .await
            .map_err(|e| DownloadError::TaskFailed(e.to_string()))?
    }
}
