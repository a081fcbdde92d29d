//! Shared application state.
//!
//! [`AppContext`] is handed to every route handler via Axum state. Everything
//! in it is cheap to clone: the supervisor is a handle, the rest sits behind
//! `Arc`s.

use std::sync::Arc;
use std::time::Instant;

use streamforge_core::config::Config;
use streamforge_core::events::EventBus;
use streamforge_core::{Error, Result};
use streamforge_transcode::{ProfileRegistry, Supervisor, SupervisorSettings, WorkerFactory};

use crate::ingest::IngestHandler;
use crate::middleware::rate_limit::{create_limiter, SharedLimiter};
use crate::telemetry::StreamMetrics;
use crate::tokens::StreamTokens;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub supervisor: Supervisor,
    pub event_bus: Arc<EventBus>,
    pub tokens: Arc<StreamTokens>,
    pub ingest: IngestHandler,
    /// `None` when metrics are disabled.
    pub metrics: Option<Arc<StreamMetrics>>,
    pub started_at: Instant,
    pub api_limiter: SharedLimiter,
    pub stream_limiter: SharedLimiter,
}

impl AppContext {
    /// Wire up the supervisor and its collaborators. Must run inside a
    /// tokio runtime.
    pub fn new(config: Config, factory: Arc<dyn WorkerFactory>) -> Result<Self> {
        let registry = ProfileRegistry::builtin();
        for name in &config.transcoding.profiles {
            if !registry.contains(name) {
                return Err(Error::UnknownProfile(name.clone()));
            }
        }

        let event_bus = Arc::new(EventBus::default());
        let supervisor = Supervisor::new(
            SupervisorSettings::from_config(&config),
            registry,
            factory,
            event_bus.clone(),
        );
        let tokens = Arc::new(StreamTokens::new(&config.security.stream_secret));
        let ingest = IngestHandler::new(
            supervisor.clone(),
            tokens.clone(),
            config.security.require_stream_token,
        );
        let metrics = if config.metrics.enabled {
            Some(Arc::new(StreamMetrics::new()?))
        } else {
            None
        };

        Ok(Self {
            api_limiter: create_limiter(config.rate_limit.api_per_minute),
            stream_limiter: create_limiter(config.rate_limit.stream_ops_per_minute),
            config: Arc::new(config),
            supervisor,
            event_bus,
            tokens,
            ingest,
            metrics,
            started_at: Instant::now(),
        })
    }
}
