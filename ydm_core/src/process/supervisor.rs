use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::types::types::{DownloadError, ExitResult};

/// Capacity of the merged stdout/stderr line channel.
const LINE_CHANNEL_SIZE: usize = 256;

/// One complete line from the child, tagged with the pipe it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    Stdout(String),
    Stderr(String),
}

impl OutputLine {
    pub fn text(&self) -> &str {
        match self {
            OutputLine::Stdout(s) | OutputLine::Stderr(s) => s,
        }
    }
}

type LineHandler = Box<dyn FnMut(&str) + Send>;

/// Spawns the downloader and hands back a [`SupervisedProcess`].
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    executable: PathBuf,
}

impl ProcessSupervisor {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Starts the executable with piped output.
    ///
    /// The process observes a child of `cancel`: cancelling the parent kills it.
    /// If `cancel` has already fired, the fresh process is killed before returning
    /// and the result is `DownloadError::Cancelled`.
    pub async fn spawn(
        &self,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<SupervisedProcess, DownloadError> {
        let spawn_error = |source: std::io::Error| DownloadError::Spawn {
            path: self.executable.display().to_string(),
            source,
        };

        let mut command = Command::new(&self.executable);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(windows)]
        {
            // CREATE_NO_WINDOW
            command.creation_flags(0x0800_0000);
        }

        log::info!(
            "[supervisor] spawning {} with {} args",
            self.executable.display(),
            args.len()
        );
        log::debug!("[supervisor] args: {:?}", args);

        let mut child = command.spawn().map_err(spawn_error)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error(std::io::Error::other("stdout not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| spawn_error(std::io::Error::other("stderr not captured")))?;

        let (tx, rx) = mpsc::channel(LINE_CHANNEL_SIZE);
        let stderr_buf = Arc::new(Mutex::new(String::new()));
        let readers = vec![
            tokio::spawn(pump_lines(stdout, tx.clone(), OutputLine::Stdout, None)),
            tokio::spawn(pump_lines(
                stderr,
                tx,
                OutputLine::Stderr,
                Some(Arc::clone(&stderr_buf)),
            )),
        ];

        let mut process = SupervisedProcess {
            child,
            lines: rx,
            readers,
            stderr: stderr_buf,
            cancel: cancel.child_token(),
            on_stdout: None,
            on_stderr: None,
        };

        if process.cancel.is_cancelled() {
            log::info!("[supervisor] cancellation requested before spawn finished");
            process.terminate().await?;
            return Err(DownloadError::Cancelled);
        }

        Ok(process)
    }
}

/// Reads `reader` to EOF, splitting on `\n` and `\r`. A trailing partial line is
/// only emitted once the pipe closes. When `sink` is set, every byte read is
/// appended to it as (lossy) text.
async fn pump_lines<R>(
    reader: R,
    tx: mpsc::Sender<OutputLine>,
    wrap: fn(String) -> OutputLine,
    sink: Option<Arc<Mutex<String>>>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(1024);

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                if let Some(sink) = sink.as_ref() {
                    if let Ok(mut guard) = sink.lock() {
                        guard.push_str(&text);
                    }
                }
                for piece in text.split(['\n', '\r']).filter(|p| !p.is_empty()) {
                    if tx.send(wrap(piece.to_string())).await.is_err() {
                        // Receiver gone: the process was cancelled or dropped.
                        return;
                    }
                }
            }
            Err(e) => {
                log::warn!("[supervisor] output pipe read failed: {}", e);
                break;
            }
        }
    }
}

/// A running downloader process. Owns the OS handle and its output streams.
pub struct SupervisedProcess {
    child: Child,
    lines: mpsc::Receiver<OutputLine>,
    readers: Vec<JoinHandle<()>>,
    stderr: Arc<Mutex<String>>,
    cancel: CancellationToken,
    on_stdout: Option<LineHandler>,
    on_stderr: Option<LineHandler>,
}

impl SupervisedProcess {
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Token observed by this process. Cancelling it kills the process at the
    /// next line read or while waiting for exit.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Register a consumer for stdout lines; used by [`wait`](Self::wait).
    pub fn on_stdout_line<F>(&mut self, handler: F)
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.on_stdout = Some(Box::new(handler));
    }

    /// Register a consumer for stderr lines; used by [`wait`](Self::wait).
    pub fn on_stderr_line<F>(&mut self, handler: F)
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.on_stderr = Some(Box::new(handler));
    }

    /// Next line from either pipe, in arrival order.
    ///
    /// Returns `None` once both pipes are closed, or as soon as cancellation is
    /// observed. No line is handed out after cancellation.
    pub async fn next_line(&mut self) -> Option<OutputLine> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let line = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            line = self.lines.recv() => line,
        };
        line.filter(|_| !self.cancel.is_cancelled())
    }

    /// Drains remaining output into the registered handlers, then waits for exit.
    ///
    /// Resolves to `Cancelled` when the token fires first; the process is dead by
    /// then. A non-zero exit is returned as an `ExitResult`, use
    /// [`ExitResult::into_result`] to turn it into an error.
    pub async fn wait(mut self) -> Result<ExitResult, DownloadError> {
        while let Some(line) = self.next_line().await {
            self.dispatch(&line);
        }

        if self.cancel.is_cancelled() {
            self.terminate().await?;
            return Err(DownloadError::Cancelled);
        }

        let cancel = self.cancel.clone();
        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            status = self.child.wait() => Some(status),
        };
        let Some(status) = status else {
            self.terminate().await?;
            return Err(DownloadError::Cancelled);
        };
        let status = status?;

        futures::future::join_all(self.readers.drain(..)).await;
        let result = ExitResult {
            code: status.code(),
            stderr: self.take_stderr(),
        };
        log::info!("[supervisor] process exited with code {:?}", result.code);
        Ok(result)
    }

    /// Kills the process and waits until it is gone. Output produced after this
    /// call is discarded.
    pub async fn cancel(&mut self) -> Result<(), DownloadError> {
        self.cancel.cancel();
        self.terminate().await
    }

    fn dispatch(&mut self, line: &OutputLine) {
        let handler = match line {
            OutputLine::Stdout(_) => self.on_stdout.as_mut(),
            OutputLine::Stderr(_) => self.on_stderr.as_mut(),
        };
        if let Some(handler) = handler {
            handler(line.text());
        }
    }

    async fn terminate(&mut self) -> Result<(), DownloadError> {
        for reader in &self.readers {
            reader.abort();
        }
        self.lines.close();

        if let Err(e) = self.child.start_kill() {
            // Already exited and reaped.
            log::debug!("[supervisor] kill: {}", e);
        }
        let status = self.child.wait().await?;
        log::info!("[supervisor] process terminated ({})", status);
        Ok(())
    }

    fn take_stderr(&self) -> String {
        self.stderr
            .lock()
            .map(|mut guard| std::mem::take(&mut *guard))
            .unwrap_or_default()
    }
}
