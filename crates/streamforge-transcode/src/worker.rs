//! The encoding worker capability.
//!
//! A [`Worker`] owns exactly one external encoder process for one stream.
//! Workers never call back into the supervisor directly: everything they
//! observe is pushed through an [`EventSink`] onto a single channel that the
//! supervisor drains in order.

use futures::future::BoxFuture;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

use streamforge_core::StreamKey;

use crate::progress::Progress;

/// Everything needed to launch one encoder.
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub stream_key: StreamKey,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub output_dir: PathBuf,
    /// How long a graceful stop may take before the process is killed.
    pub stop_grace: Duration,
}

/// Observable outcome of a running worker.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Progress(Progress),
    /// The process exited. Emitted at most once per worker.
    Exited {
        code: Option<i32>,
        signal: Option<i32>,
    },
    /// The process could not be supervised any further. Emitted at most
    /// once per worker, never together with `Exited`.
    Failed { error: String },
}

/// A worker event tagged with the worker that produced it.
#[derive(Debug, Clone)]
pub struct WorkerMessage {
    pub stream_key: StreamKey,
    /// Distinguishes successive workers for the same key.
    pub generation: u64,
    pub event: WorkerEvent,
}

/// Sending half handed to a worker when it is created.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<WorkerMessage>,
    stream_key: StreamKey,
    generation: u64,
}

impl EventSink {
    pub fn new(
        tx: mpsc::UnboundedSender<WorkerMessage>,
        stream_key: StreamKey,
        generation: u64,
    ) -> Self {
        Self {
            tx,
            stream_key,
            generation,
        }
    }

    pub fn stream_key(&self) -> &StreamKey {
        &self.stream_key
    }

    pub fn emit(&self, event: WorkerEvent) {
        let msg = WorkerMessage {
            stream_key: self.stream_key.clone(),
            generation: self.generation,
            event,
        };
        if self.tx.send(msg).is_err() {
            tracing::debug!(stream_key = %self.stream_key, "Supervisor gone; dropping worker event");
        }
    }
}

/// Point-in-time view of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
    pub running: bool,
    pub uptime_ms: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("worker is already running")]
    AlreadyRunning,
    #[error("failed to start encoder: {0}")]
    StartFailure(String),
}

/// One external encoding process.
///
/// `idle -> starting -> running -> exited | failed`. An instance is never
/// restarted once it has left `running`.
pub trait Worker: Send + Sync {
    /// Launch the process. Returns once the process handle exists.
    fn start(&self) -> Result<(), WorkerError>;

    /// Ask the process to terminate. Never blocks; the exit arrives later as
    /// [`WorkerEvent::Exited`]. A no-op when not running.
    fn stop(&self);

    fn status(&self) -> WorkerStatus;

    /// Resolves once the process has been observed to end (or immediately
    /// if it never started).
    fn terminated(&self) -> BoxFuture<'static, ()>;
}

/// Creates workers for the supervisor.
pub trait WorkerFactory: Send + Sync {
    fn create(&self, spec: WorkerSpec, events: EventSink) -> Box<dyn Worker>;
}
