//! Native ffmpeg subprocess worker.
//!
//! The process is spawned with tokio, its stderr scanned for progress, and
//! its exit observed by a background task. Stopping sends SIGINT so ffmpeg
//! can finalize playlists; if the process is still alive after the grace
//! period it is killed.

use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::progress::{parse_progress, split_lines};
use crate::worker::{EventSink, Worker, WorkerError, WorkerEvent, WorkerFactory, WorkerSpec, WorkerStatus};

/// Upper bound on waiting for stderr to drain after the process exits.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Default)]
struct Lifecycle {
    started: bool,
    started_at: Option<Instant>,
    pid: Option<u32>,
}

/// A [`Worker`] backed by a real ffmpeg process.
///
/// Must be started from within a tokio runtime.
pub struct FfmpegWorker {
    spec: WorkerSpec,
    events: EventSink,
    lifecycle: Mutex<Lifecycle>,
    running: Arc<AtomicBool>,
    stop_requested: CancellationToken,
    terminated: CancellationToken,
}

impl FfmpegWorker {
    pub fn new(spec: WorkerSpec, events: EventSink) -> Self {
        Self {
            spec,
            events,
            lifecycle: Mutex::new(Lifecycle::default()),
            running: Arc::new(AtomicBool::new(false)),
            stop_requested: CancellationToken::new(),
            terminated: CancellationToken::new(),
        }
    }
}

impl Worker for FfmpegWorker {
    fn start(&self) -> Result<(), WorkerError> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.started {
            tracing::warn!(stream_key = %self.spec.stream_key, "Encoder already started");
            return Err(WorkerError::AlreadyRunning);
        }
        lifecycle.started = true;

        let mut cmd = Command::new(&self.spec.program);
        cmd.args(&self.spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(
            stream_key = %self.spec.stream_key,
            "Spawning {} {}",
            self.spec.program.display(),
            self.spec.args.join(" ")
        );

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                // Nothing to wait for.
                self.terminated.cancel();
                return Err(WorkerError::StartFailure(format!(
                    "{}: {e}",
                    self.spec.program.display()
                )));
            }
        };

        lifecycle.pid = child.id();
        lifecycle.started_at = Some(Instant::now());
        self.running.store(true, Ordering::SeqCst);

        let reader = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(read_diagnostics(stderr, self.events.clone())));

        tokio::spawn(watch_process(
            child,
            reader,
            ProcessWatch {
                events: self.events.clone(),
                running: self.running.clone(),
                stop_requested: self.stop_requested.clone(),
                terminated: self.terminated.clone(),
                stop_grace: self.spec.stop_grace,
            },
        ));

        tracing::info!(
            stream_key = %self.spec.stream_key,
            pid = ?lifecycle.pid,
            output_dir = %self.spec.output_dir.display(),
            "Encoder started"
        );
        Ok(())
    }

    fn stop(&self) {
        if !self.running.load(Ordering::SeqCst) {
            tracing::debug!(stream_key = %self.spec.stream_key, "Encoder not running; ignoring stop");
            return;
        }
        if self.stop_requested.is_cancelled() {
            tracing::debug!(stream_key = %self.spec.stream_key, "Stop already requested");
            return;
        }

        let pid = self.lifecycle.lock().pid;
        self.stop_requested.cancel();
        if let Some(pid) = pid {
            send_interrupt(pid);
        }
        tracing::info!(stream_key = %self.spec.stream_key, "Encoder stop requested");
    }

    fn status(&self) -> WorkerStatus {
        let lifecycle = self.lifecycle.lock();
        WorkerStatus {
            running: self.running.load(Ordering::SeqCst),
            uptime_ms: lifecycle
                .started_at
                .map(|t| t.elapsed().as_millis() as u64)
                .unwrap_or(0),
        }
    }

    fn terminated(&self) -> BoxFuture<'static, ()> {
        self.terminated.clone().cancelled_owned().boxed()
    }
}

/// Scan encoder diagnostics for progress lines.
async fn read_diagnostics(stderr: ChildStderr, events: EventSink) {
    let mut segments = BufReader::new(stderr).split(b'\r');
    loop {
        match segments.next_segment().await {
            Ok(Some(bytes)) => {
                let chunk = String::from_utf8_lossy(&bytes);
                for line in split_lines(&chunk) {
                    tracing::trace!(stream_key = %events.stream_key(), "ffmpeg: {line}");
                    if let Some(progress) = parse_progress(line) {
                        events.emit(WorkerEvent::Progress(progress));
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(stream_key = %events.stream_key(), "Encoder stderr read failed: {e}");
                break;
            }
        }
    }
}

struct ProcessWatch {
    events: EventSink,
    running: Arc<AtomicBool>,
    stop_requested: CancellationToken,
    terminated: CancellationToken,
    stop_grace: Duration,
}

/// Wait for the process to end, escalating to a kill if a requested stop
/// outlives the grace period, then report exactly one terminal event.
async fn watch_process(mut child: Child, reader: Option<JoinHandle<()>>, watch: ProcessWatch) {
    let key = watch.events.stream_key().clone();
    let escalate = async {
        watch.stop_requested.cancelled().await;
        tokio::time::sleep(watch.stop_grace).await;
    };

    let waited = tokio::select! {
        res = child.wait() => Some(res),
        _ = escalate => None,
    };

    let result = match waited {
        Some(res) => res,
        None => {
            tracing::warn!(stream_key = %key, grace = ?watch.stop_grace, "Encoder ignored stop request; killing");
            if let Err(e) = child.start_kill() {
                tracing::warn!(stream_key = %key, "Failed to kill encoder: {e}");
            }
            child.wait().await
        }
    };

    // Progress lines must be delivered before the terminal event.
    if let Some(reader) = reader {
        if !drain_reader(reader, STDERR_DRAIN_TIMEOUT).await {
            tracing::debug!(stream_key = %key, "Encoder stderr still open after exit");
        }
    }

    watch.running.store(false, Ordering::SeqCst);
    match result {
        Ok(status) => {
            let (code, signal) = exit_parts(&status);
            tracing::info!(stream_key = %key, ?code, ?signal, "Encoder exited");
            watch.events.emit(WorkerEvent::Exited { code, signal });
        }
        Err(e) => {
            tracing::error!(stream_key = %key, "Lost track of encoder process: {e}");
            watch.events.emit(WorkerEvent::Failed {
                error: e.to_string(),
            });
        }
    }
    watch.terminated.cancel();
}

/// Wait up to `limit` for the stderr reader to finish. A pipe kept open by
/// a leaked grandchild would otherwise pin the task forever, so it is
/// aborted on timeout. Returns whether the reader finished on its own.
async fn drain_reader(mut reader: JoinHandle<()>, limit: Duration) -> bool {
    if tokio::time::timeout(limit, &mut reader).await.is_ok() {
        return true;
    }
    reader.abort();
    false
}

#[cfg(unix)]
fn exit_parts(status: &ExitStatus) -> (Option<i32>, Option<i32>) {
    use std::os::unix::process::ExitStatusExt;
    (status.code(), status.signal())
}

#[cfg(not(unix))]
fn exit_parts(status: &ExitStatus) -> (Option<i32>, Option<i32>) {
    (status.code(), None)
}

#[cfg(unix)]
fn send_interrupt(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGINT) {
        tracing::warn!(pid, "Failed to interrupt encoder: {e}");
    }
}

// Without signals the grace-period kill is the only way to stop.
#[cfg(not(unix))]
fn send_interrupt(_pid: u32) {}

/// Produces [`FfmpegWorker`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegWorkerFactory;

impl WorkerFactory for FfmpegWorkerFactory {
    fn create(&self, spec: WorkerSpec, events: EventSink) -> Box<dyn Worker> {
        Box::new(FfmpegWorker::new(spec, events))
    }
}
