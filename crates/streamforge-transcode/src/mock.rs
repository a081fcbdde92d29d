//! In-memory worker for exercising the supervisor without ffmpeg.
//!
//! Every worker created by a [`MockWorkerFactory`] is recorded; tests reach
//! it through a [`MockHandle`] and script its progress and exit.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::progress::Progress;
use crate::worker::{EventSink, Worker, WorkerError, WorkerEvent, WorkerFactory, WorkerSpec, WorkerStatus};

/// Exit code ffmpeg reports after handling SIGINT.
const INTERRUPTED_EXIT_CODE: i32 = 255;

#[derive(Debug)]
struct MockShared {
    spec: WorkerSpec,
    events: EventSink,
    started: AtomicBool,
    running: AtomicBool,
    finished: AtomicBool,
    stop_calls: AtomicUsize,
    started_at: Mutex<Option<Instant>>,
    terminated: CancellationToken,
    exit_on_stop: bool,
}

impl MockShared {
    /// Emit a terminal event unless one was already sent.
    fn finish(&self, event: WorkerEvent) -> bool {
        if self.finished.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.running.store(false, Ordering::SeqCst);
        self.events.emit(event);
        self.terminated.cancel();
        true
    }
}

struct MockWorker {
    shared: Arc<MockShared>,
    fail_start: bool,
}

impl Worker for MockWorker {
    fn start(&self) -> Result<(), WorkerError> {
        if self.shared.started.swap(true, Ordering::SeqCst) {
            return Err(WorkerError::AlreadyRunning);
        }
        if self.fail_start {
            self.shared.finished.store(true, Ordering::SeqCst);
            self.shared.terminated.cancel();
            return Err(WorkerError::StartFailure("mock spawn failure".into()));
        }
        *self.shared.started_at.lock() = Some(Instant::now());
        self.shared.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.shared.stop_calls.fetch_add(1, Ordering::SeqCst);
        if !self.shared.running.load(Ordering::SeqCst) {
            return;
        }
        if self.shared.exit_on_stop {
            self.shared.finish(WorkerEvent::Exited {
                code: Some(INTERRUPTED_EXIT_CODE),
                signal: None,
            });
        }
    }

    fn status(&self) -> WorkerStatus {
        WorkerStatus {
            running: self.shared.running.load(Ordering::SeqCst),
            uptime_ms: self
                .shared
                .started_at
                .lock()
                .map(|t| t.elapsed().as_millis() as u64)
                .unwrap_or(0),
        }
    }

    fn terminated(&self) -> BoxFuture<'static, ()> {
        self.shared.terminated.clone().cancelled_owned().boxed()
    }
}

/// Test-side view of one mock worker.
#[derive(Debug, Clone)]
pub struct MockHandle {
    shared: Arc<MockShared>,
}

impl MockHandle {
    pub fn spec(&self) -> &WorkerSpec {
        &self.shared.spec
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.shared.stop_calls.load(Ordering::SeqCst)
    }

    pub fn progress(&self, fps: u32, bitrate: &str) {
        self.shared.events.emit(WorkerEvent::Progress(Progress {
            fps: Some(fps),
            bitrate: Some(bitrate.to_string()),
        }));
    }

    /// Simulate the process exiting. Returns false if it already ended.
    pub fn exit(&self, code: Option<i32>, signal: Option<i32>) -> bool {
        self.shared.finish(WorkerEvent::Exited { code, signal })
    }

    /// Simulate a runtime failure. Returns false if it already ended.
    pub fn fail(&self, error: &str) -> bool {
        self.shared.finish(WorkerEvent::Failed {
            error: error.to_string(),
        })
    }
}

#[derive(Debug, Default)]
struct FactoryState {
    created: Vec<MockHandle>,
    fail_next_start: bool,
}

/// Factory producing scriptable in-memory workers.
#[derive(Debug, Clone)]
pub struct MockWorkerFactory {
    state: Arc<Mutex<FactoryState>>,
    exit_on_stop: bool,
}

impl Default for MockWorkerFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MockWorkerFactory {
    /// Workers exit (code 255) as soon as they are stopped, like ffmpeg.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FactoryState::default())),
            exit_on_stop: true,
        }
    }

    /// Workers ignore stop requests until the test calls [`MockHandle::exit`].
    pub fn stubborn() -> Self {
        Self {
            exit_on_stop: false,
            ..Self::new()
        }
    }

    /// Make the next created worker fail in `start()`.
    pub fn fail_next_start(&self) {
        self.state.lock().fail_next_start = true;
    }

    pub fn created(&self) -> Vec<MockHandle> {
        self.state.lock().created.clone()
    }

    pub fn created_count(&self) -> usize {
        self.state.lock().created.len()
    }

    /// Most recently created worker for a sanitized key.
    pub fn latest(&self, key: &str) -> Option<MockHandle> {
        self.state
            .lock()
            .created
            .iter()
            .rev()
            .find(|h| h.shared.spec.stream_key.as_str() == key)
            .cloned()
    }
}

impl WorkerFactory for MockWorkerFactory {
    fn create(&self, spec: WorkerSpec, events: EventSink) -> Box<dyn Worker> {
        let mut state = self.state.lock();
        let fail_start = std::mem::take(&mut state.fail_next_start);
        let shared = Arc::new(MockShared {
            spec,
            events,
            started: AtomicBool::new(false),
            running: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            stop_calls: AtomicUsize::new(0),
            started_at: Mutex::new(None),
            terminated: CancellationToken::new(),
            exit_on_stop: self.exit_on_stop,
        });
        state.created.push(MockHandle {
            shared: shared.clone(),
        });
        Box::new(MockWorker { shared, fail_start })
    }
}
