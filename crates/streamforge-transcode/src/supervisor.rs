//! The transcoding supervisor.
//!
//! [`Supervisor`] owns every worker and stream record. Admission checks,
//! registration and event-driven teardown all run under one mutex, so the
//! concurrency ceiling can never be exceeded by racing start calls. Worker
//! events arrive on a single channel drained by one pump task, which keeps
//! per-stream events in order: `started -> progress* -> (error | ended)`.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use streamforge_core::config::Config;
use streamforge_core::events::{EventBus, EventPayload};
use streamforge_core::{Error, Result, StreamKey, StreamRecord, StreamStatus};

use crate::command::{build_args, input_url};
use crate::profile::ProfileRegistry;
use crate::worker::{EventSink, Worker, WorkerEvent, WorkerFactory, WorkerMessage, WorkerSpec, WorkerStatus};

/// Knobs the supervisor reads from configuration.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub hls_root: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub max_concurrent_streams: usize,
    /// Used when a stream is started without naming a profile.
    pub default_profile: Option<String>,
    pub input_url_template: String,
    pub stop_grace: Duration,
    pub source_audio: bool,
}

impl SupervisorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            hls_root: config.storage.hls_root.clone(),
            ffmpeg_path: config.transcoding.ffmpeg_path.clone(),
            max_concurrent_streams: config.transcoding.max_concurrent_streams,
            default_profile: config.default_profile().map(str::to_string),
            input_url_template: config.transcoding.input_url_template.clone(),
            stop_grace: Duration::from_secs(config.transcoding.stop_grace_secs),
            source_audio: config.transcoding.source_audio,
        }
    }
}

struct Registered {
    worker: Arc<dyn Worker>,
    generation: u64,
}

#[derive(Default)]
struct State {
    workers: HashMap<StreamKey, Registered>,
    records: HashMap<StreamKey, StreamRecord>,
}

struct Shared {
    settings: SupervisorSettings,
    registry: ProfileRegistry,
    factory: Arc<dyn WorkerFactory>,
    bus: Arc<EventBus>,
    state: Mutex<State>,
    tx: mpsc::UnboundedSender<WorkerMessage>,
    next_generation: AtomicU64,
}

/// Cheaply cloneable handle to the shared supervisor.
#[derive(Clone)]
pub struct Supervisor {
    shared: Arc<Shared>,
}

impl Supervisor {
    /// Create a supervisor and spawn its event pump. Must be called from
    /// within a tokio runtime.
    pub fn new(
        settings: SupervisorSettings,
        registry: ProfileRegistry,
        factory: Arc<dyn WorkerFactory>,
        bus: Arc<EventBus>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            settings,
            registry,
            factory,
            bus,
            state: Mutex::new(State::default()),
            tx,
            next_generation: AtomicU64::new(1),
        });
        tokio::spawn(pump(Arc::downgrade(&shared), rx));
        Self { shared }
    }

    pub fn registry(&self) -> &ProfileRegistry {
        &self.shared.registry
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.shared.settings
    }

    /// Start transcoding `raw_key`, or return the existing record if a
    /// worker is already running for it.
    pub fn start_stream(&self, raw_key: &str, profile: Option<&str>) -> Result<StreamRecord> {
        let key = StreamKey::sanitize(raw_key);
        if key.is_empty() {
            return Err(Error::Validation("stream key is required".into()));
        }

        let shared = &self.shared;
        let mut state = shared.state.lock();

        if state.workers.contains_key(&key) {
            let record = state
                .records
                .get(&key)
                .cloned()
                .ok_or_else(|| Error::Internal(format!("worker without record for {key}")))?;
            if record.raw_key != raw_key {
                tracing::warn!(
                    stream_key = %key,
                    raw_key,
                    active_raw_key = %record.raw_key,
                    "Rejecting stream key that collides with an active stream"
                );
                return Err(Error::Conflict(format!(
                    "stream key '{raw_key}' maps to '{key}', which is already live"
                )));
            }
            tracing::info!(stream_key = %key, "Stream already running");
            return Ok(record);
        }

        let limit = shared.settings.max_concurrent_streams;
        if state.workers.len() >= limit {
            tracing::warn!(stream_key = %key, limit, "Stream limit reached");
            return Err(Error::StreamLimitExceeded { limit });
        }

        let profile_name = profile
            .or(shared.settings.default_profile.as_deref())
            .ok_or_else(|| Error::Validation("no profile given and no default configured".into()))?;
        let profile = shared.registry.get(profile_name)?;

        let output_dir = shared.settings.hls_root.join(key.as_str());
        std::fs::create_dir_all(&output_dir)?;

        let input = input_url(&shared.settings.input_url_template, &key);
        let spec = WorkerSpec {
            stream_key: key.clone(),
            program: shared.settings.ffmpeg_path.clone(),
            args: build_args(profile, &input, &output_dir, shared.settings.source_audio),
            output_dir,
            stop_grace: shared.settings.stop_grace,
        };

        let generation = shared.next_generation.fetch_add(1, Ordering::Relaxed);
        let sink = EventSink::new(shared.tx.clone(), key.clone(), generation);
        let worker: Arc<dyn Worker> = Arc::from(shared.factory.create(spec, sink));

        worker.start().map_err(|e| {
            tracing::error!(stream_key = %key, "Failed to start transcoding: {e}");
            Error::transcoding(e)
        })?;

        state
            .workers
            .insert(key.clone(), Registered { worker, generation });
        let record = StreamRecord::active(key.clone(), raw_key, &profile.name);
        state.records.insert(key.clone(), record.clone());

        // Published under the lock so no worker event for this key can
        // overtake it.
        shared.bus.publish(EventPayload::StreamStarted {
            stream_key: key.clone(),
            profile: profile.name.clone(),
        });
        tracing::info!(stream_key = %key, profile = %profile.name, "Stream started");

        Ok(record)
    }

    /// Stop the worker for `raw_key`. Returns whether a worker was running.
    ///
    /// Bookkeeping is cleared immediately; the process exit is observed
    /// later and handled as a no-op for state.
    pub fn stop_stream(&self, raw_key: &str) -> bool {
        let key = StreamKey::sanitize(raw_key);
        let mut state = self.shared.state.lock();

        let Some(registered) = state.workers.remove(&key) else {
            tracing::debug!(stream_key = %key, "No running worker; nothing to stop");
            return false;
        };
        registered.worker.stop();
        if let Some(record) = state.records.get_mut(&key) {
            record.status = StreamStatus::Stopped;
        }
        tracing::info!(stream_key = %key, "Stream stopped");
        true
    }

    /// Stop every worker and wait (up to `timeout`) for their processes to
    /// end. Used at shutdown so no encoder outlives the service.
    pub async fn stop_all(&self, timeout: Duration) {
        let workers: Vec<(StreamKey, Arc<dyn Worker>)> = {
            let mut state = self.shared.state.lock();
            let drained: Vec<_> = state
                .workers
                .drain()
                .map(|(key, reg)| (key, reg.worker))
                .collect();
            for (key, _) in &drained {
                if let Some(record) = state.records.get_mut(key) {
                    record.status = StreamStatus::Stopped;
                }
            }
            drained
        };

        if workers.is_empty() {
            return;
        }
        tracing::info!(count = workers.len(), "Stopping all streams");

        for (_, worker) in &workers {
            worker.stop();
        }
        let waits = workers.iter().map(|(_, w)| w.terminated());
        if tokio::time::timeout(timeout, futures::future::join_all(waits))
            .await
            .is_err()
        {
            let pending: Vec<String> = workers
                .iter()
                .filter(|(_, w)| w.status().running)
                .map(|(k, _)| k.to_string())
                .collect();
            tracing::warn!(?pending, "Encoders still running after shutdown timeout");
        }
    }

    /// All records with `active` status, oldest first.
    pub fn active_streams(&self) -> Vec<StreamRecord> {
        let state = self.shared.state.lock();
        let mut active: Vec<StreamRecord> = state
            .records
            .values()
            .filter(|r| r.status == StreamStatus::Active)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        active
    }

    pub fn stream_info(&self, raw_key: &str) -> Result<StreamRecord> {
        let key = StreamKey::sanitize(raw_key);
        self.shared
            .state
            .lock()
            .records
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::not_found("Stream", key))
    }

    pub fn worker_status(&self, raw_key: &str) -> Option<WorkerStatus> {
        let key = StreamKey::sanitize(raw_key);
        self.shared
            .state
            .lock()
            .workers
            .get(&key)
            .map(|r| r.worker.status())
    }

    pub fn worker_count(&self) -> usize {
        self.shared.state.lock().workers.len()
    }

    pub fn max_concurrent_streams(&self) -> usize {
        self.shared.settings.max_concurrent_streams
    }

    /// Keys that currently have a registered worker.
    pub fn live_keys(&self) -> HashSet<StreamKey> {
        self.shared.state.lock().workers.keys().cloned().collect()
    }

    /// False once the event pump has gone away.
    pub fn is_healthy(&self) -> bool {
        !self.shared.tx.is_closed()
    }
}

impl Shared {
    fn handle(&self, msg: WorkerMessage) {
        let WorkerMessage {
            stream_key: key,
            generation,
            event,
        } = msg;
        let mut state = self.state.lock();
        let current = state.workers.get(&key).map(|r| r.generation);

        match event {
            WorkerEvent::Progress(progress) => {
                if current == Some(generation) {
                    self.bus.publish(EventPayload::StreamProgress {
                        stream_key: key,
                        fps: progress.fps,
                        bitrate: progress.bitrate,
                    });
                }
            }
            WorkerEvent::Exited { code, signal } => {
                if current.is_some_and(|g| g != generation) {
                    tracing::debug!(stream_key = %key, generation, "Ignoring exit of superseded worker");
                    return;
                }
                if current.is_some() {
                    state.workers.remove(&key);
                }
                let mut duration_secs = 0.0;
                if let Some(record) = state.records.get_mut(&key) {
                    if record.status == StreamStatus::Active {
                        record.status = StreamStatus::Stopped;
                    }
                    duration_secs = record.duration_secs();
                }
                tracing::info!(stream_key = %key, ?code, ?signal, "Stream ended");
                self.bus.publish(EventPayload::StreamEnded {
                    stream_key: key,
                    code,
                    signal,
                    duration_secs,
                });
            }
            WorkerEvent::Failed { error } => {
                if current.is_some_and(|g| g != generation) {
                    tracing::debug!(stream_key = %key, generation, "Ignoring failure of superseded worker");
                    return;
                }
                if current.is_none() {
                    // Already stopped: the failure is how this run ended, the
                    // record keeps its stopped status.
                    tracing::warn!(stream_key = %key, "Stopped encoder failed while exiting: {error}");
                    let duration_secs = state
                        .records
                        .get(&key)
                        .map_or(0.0, StreamRecord::duration_secs);
                    self.bus.publish(EventPayload::StreamEnded {
                        stream_key: key,
                        code: None,
                        signal: None,
                        duration_secs,
                    });
                    return;
                }
                // A failed worker is never restarted; free its slot.
                state.workers.remove(&key);
                let mut duration_secs = 0.0;
                if let Some(record) = state.records.get_mut(&key) {
                    record.status = StreamStatus::Error;
                    duration_secs = record.duration_secs();
                }
                tracing::error!(stream_key = %key, "Transcoding failed: {error}");
                self.bus.publish(EventPayload::StreamError {
                    stream_key: key,
                    error,
                    duration_secs,
                });
            }
        }
    }
}

async fn pump(shared: Weak<Shared>, mut rx: mpsc::UnboundedReceiver<WorkerMessage>) {
    while let Some(msg) = rx.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.handle(msg);
    }
    tracing::debug!("Supervisor event pump finished");
}
