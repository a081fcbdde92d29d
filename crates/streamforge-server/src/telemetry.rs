//! Prometheus metrics driven by the event bus.
//!
//! The recorder is kept local to the service instead of being installed
//! globally, so several servers can live in one process (tests do this).

use std::sync::Arc;

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use streamforge_core::events::{EventBus, EventPayload};
use streamforge_core::{Error, Result};
use streamforge_transcode::Supervisor;

pub const ACTIVE_STREAMS: &str = "rtmp_active_streams";
pub const STREAM_STARTS: &str = "rtmp_stream_starts_total";
pub const STREAM_ENDS: &str = "rtmp_stream_ends_total";
pub const TRANSCODING_ERRORS: &str = "rtmp_transcoding_errors_total";
pub const STREAM_DURATION: &str = "rtmp_stream_duration_seconds";

const DURATION_BUCKETS: [f64; 6] = [60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0];

pub struct StreamMetrics {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
}

impl StreamMetrics {
    pub fn new() -> Result<Self> {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(Matcher::Full(STREAM_DURATION.to_string()), &DURATION_BUCKETS)
            .map_err(|e| Error::Internal(format!("metrics setup failed: {e}")))?
            .build_recorder();
        let handle = recorder.handle();
        Ok(Self { recorder, handle })
    }

    /// Update counters for one bus event. `active` is the current worker
    /// count, used for the active-streams gauge.
    pub fn record(&self, payload: &EventPayload, active: usize) {
        metrics::with_local_recorder(&self.recorder, || {
            metrics::gauge!(ACTIVE_STREAMS).set(active as f64);
            match payload {
                EventPayload::StreamStarted { profile, .. } => {
                    metrics::counter!(STREAM_STARTS, "profile" => profile.clone()).increment(1);
                }
                EventPayload::StreamEnded { duration_secs, .. } => {
                    metrics::counter!(STREAM_ENDS, "reason" => "normal").increment(1);
                    metrics::histogram!(STREAM_DURATION).record(*duration_secs);
                }
                EventPayload::StreamError {
                    stream_key,
                    duration_secs,
                    ..
                } => {
                    metrics::counter!(STREAM_ENDS, "reason" => "error").increment(1);
                    metrics::counter!(TRANSCODING_ERRORS, "stream_key" => stream_key.to_string())
                        .increment(1);
                    metrics::histogram!(STREAM_DURATION).record(*duration_secs);
                }
                EventPayload::StreamProgress { .. } => {}
            }
        });
    }

    /// Set the active-streams gauge without an event.
    pub fn set_active(&self, active: usize) {
        metrics::with_local_recorder(&self.recorder, || {
            metrics::gauge!(ACTIVE_STREAMS).set(active as f64);
        });
    }

    /// Prometheus text exposition.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Consume bus events until cancelled.
pub async fn run_recorder(
    metrics: Arc<StreamMetrics>,
    bus: Arc<EventBus>,
    supervisor: Supervisor,
    cancel: CancellationToken,
) {
    let mut rx = bus.subscribe();
    metrics.set_active(supervisor.worker_count());

    loop {
        tokio::select! {
            result = rx.recv() => match result {
                Ok(event) => metrics.record(&event.payload, supervisor.worker_count()),
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!("Metrics recorder lagged by {n} events");
                    metrics.set_active(supervisor.worker_count());
                }
                Err(RecvError::Closed) => break,
            },
            _ = cancel.cancelled() => break,
        }
    }
    tracing::debug!("Metrics recorder stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamforge_core::StreamKey;

    #[test]
    fn records_lifecycle() {
        let metrics = StreamMetrics::new().unwrap();
        let key = StreamKey::sanitize("alpha");

        metrics.record(
            &EventPayload::StreamStarted {
                stream_key: key.clone(),
                profile: "adaptive".into(),
            },
            1,
        );
        metrics.record(
            &EventPayload::StreamError {
                stream_key: key.clone(),
                error: "boom".into(),
                duration_secs: 120.0,
            },
            0,
        );

        let text = metrics.render();
        assert!(text.contains("rtmp_stream_starts_total{profile=\"adaptive\"} 1"));
        assert!(text.contains("rtmp_stream_ends_total{reason=\"error\"} 1"));
        assert!(text.contains("rtmp_transcoding_errors_total{stream_key=\"alpha\"} 1"));
        assert!(text.contains("rtmp_active_streams 0"));
        assert!(text.contains("rtmp_stream_duration_seconds_bucket{le=\"300\"} 1"));
    }

    #[test]
    fn progress_only_touches_gauge() {
        let metrics = StreamMetrics::new().unwrap();
        metrics.record(
            &EventPayload::StreamProgress {
                stream_key: StreamKey::sanitize("alpha"),
                fps: Some(30),
                bitrate: None,
            },
            3,
        );
        let text = metrics.render();
        assert!(text.contains("rtmp_active_streams 3"));
        assert!(!text.contains("rtmp_stream_starts_total"));
    }

    #[test]
    fn separate_instances_do_not_share_state() {
        let a = StreamMetrics::new().unwrap();
        let b = StreamMetrics::new().unwrap();
        a.set_active(5);
        assert!(a.render().contains("rtmp_active_streams 5"));
        assert!(!b.render().contains("rtmp_active_streams 5"));
    }
}
