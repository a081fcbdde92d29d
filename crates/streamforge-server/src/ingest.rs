//! Adapter between publish-session callbacks and the supervisor.
//!
//! The ingest server (nginx-rtmp, SRS, or anything that can call a hook)
//! reports three moments of a publish session. Only the pre-publish check
//! can reject a session; start failures after that are logged, not
//! propagated, because the publisher is already connected.

use std::sync::Arc;

use serde::Deserialize;

use streamforge_core::{extract_stream_key, validate_stream_key, Error, Result};
use streamforge_transcode::Supervisor;

use crate::tokens::StreamTokens;

/// Extra arguments attached to a publish session.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublishArgs {
    pub token: Option<String>,
    /// Encode profile requested by the publisher.
    pub profile: Option<String>,
}

#[derive(Clone)]
pub struct IngestHandler {
    supervisor: Supervisor,
    tokens: Arc<StreamTokens>,
    require_token: bool,
}

impl IngestHandler {
    pub fn new(supervisor: Supervisor, tokens: Arc<StreamTokens>, require_token: bool) -> Self {
        Self {
            supervisor,
            tokens,
            require_token,
        }
    }

    /// Decide whether a publish session may proceed.
    pub fn on_publish_start(&self, stream_path: &str, args: &PublishArgs) -> Result<()> {
        tracing::info!(stream_path, "Pre-publish");

        let key = extract_stream_key(stream_path)?;
        if let Err(e) = validate_stream_key(&key) {
            tracing::warn!(stream_key = %key, "Pre-publish validation failed: {e}");
            return Err(e);
        }

        if self.require_token {
            let token = args
                .token
                .as_deref()
                .ok_or_else(|| Error::Unauthorized("stream token required".into()))?;
            if !self.tokens.verify(&key, token) {
                tracing::warn!(stream_key = %key, "Rejected publish with invalid token");
                return Err(Error::Unauthorized("invalid stream token".into()));
            }
        }

        Ok(())
    }

    /// The publisher is live: start transcoding.
    pub fn on_publish_confirmed(&self, stream_path: &str, args: &PublishArgs) {
        tracing::info!(stream_path, "Post-publish");

        let key = match extract_stream_key(stream_path) {
            Ok(key) => key,
            Err(e) => {
                tracing::error!(stream_path, "Cannot derive stream key: {e}");
                return;
            }
        };
        if let Err(e) = self.supervisor.start_stream(&key, args.profile.as_deref()) {
            tracing::error!(stream_key = %key, "Failed to start transcoding: {e}");
        }
    }

    /// The publisher went away: stop transcoding.
    pub fn on_publish_end(&self, stream_path: &str, _args: &PublishArgs) {
        tracing::info!(stream_path, "Done-publish");

        match extract_stream_key(stream_path) {
            Ok(key) => {
                self.supervisor.stop_stream(&key);
            }
            Err(e) => tracing::error!(stream_path, "Cannot derive stream key: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;
    use streamforge_core::events::EventBus;
    use streamforge_core::StreamStatus;
    use streamforge_transcode::mock::MockWorkerFactory;
    use streamforge_transcode::{ProfileRegistry, SupervisorSettings};

    fn handler(require_token: bool, dir: &std::path::Path) -> (IngestHandler, Supervisor) {
        let supervisor = Supervisor::new(
            SupervisorSettings {
                hls_root: dir.to_path_buf(),
                ffmpeg_path: PathBuf::from("ffmpeg"),
                max_concurrent_streams: 1,
                default_profile: Some("adaptive".into()),
                input_url_template: "rtmp://127.0.0.1/live/{key}".into(),
                stop_grace: Duration::from_secs(1),
                source_audio: true,
            },
            ProfileRegistry::builtin(),
            Arc::new(MockWorkerFactory::new()),
            Arc::new(EventBus::default()),
        );
        let tokens = Arc::new(StreamTokens::new("secret"));
        (
            IngestHandler::new(supervisor.clone(), tokens, require_token),
            supervisor,
        )
    }

    #[tokio::test]
    async fn pre_publish_validates_key() {
        let dir = tempfile::tempdir().unwrap();
        let (h, _) = handler(false, dir.path());
        assert!(h.on_publish_start("/live/alpha", &PublishArgs::default()).is_ok());
        assert!(matches!(
            h.on_publish_start("/live/a", &PublishArgs::default()),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            h.on_publish_start("/", &PublishArgs::default()),
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn pre_publish_checks_token_when_required() {
        let dir = tempfile::tempdir().unwrap();
        let (h, _) = handler(true, dir.path());
        assert!(matches!(
            h.on_publish_start("/live/alpha", &PublishArgs::default()),
            Err(Error::Unauthorized(_))
        ));

        let bad = PublishArgs {
            token: Some("deadbeef".into()),
            profile: None,
        };
        assert!(matches!(
            h.on_publish_start("/live/alpha", &bad),
            Err(Error::Unauthorized(_))
        ));

        let good = PublishArgs {
            token: Some(StreamTokens::new("secret").create("alpha").unwrap()),
            profile: None,
        };
        assert!(h.on_publish_start("/live/alpha", &good).is_ok());
    }

    #[tokio::test]
    async fn confirmed_and_done_drive_supervisor() {
        let dir = tempfile::tempdir().unwrap();
        let (h, supervisor) = handler(false, dir.path());

        h.on_publish_confirmed("/live/alpha", &PublishArgs::default());
        assert_eq!(supervisor.worker_count(), 1);

        // Over the limit: logged, not propagated.
        h.on_publish_confirmed("/live/beta", &PublishArgs::default());
        assert_eq!(supervisor.worker_count(), 1);
        assert!(supervisor.stream_info("beta").is_err());

        h.on_publish_end("/live/alpha", &PublishArgs::default());
        assert_eq!(supervisor.worker_count(), 0);
        assert_eq!(
            supervisor.stream_info("alpha").unwrap().status,
            StreamStatus::Stopped
        );
    }

    #[tokio::test]
    async fn confirmed_honours_requested_profile() {
        let dir = tempfile::tempdir().unwrap();
        let (h, supervisor) = handler(false, dir.path());
        let args = PublishArgs {
            token: None,
            profile: Some("low_latency".into()),
        };
        h.on_publish_confirmed("live/alpha", &args);
        assert_eq!(supervisor.stream_info("alpha").unwrap().profile, "low_latency");
    }
}
