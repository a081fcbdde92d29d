//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which builds a full [`AppContext`] on top of a
//! [`MockWorkerFactory`] and a temporary HLS root. The `with_server`
//! constructors start Axum on a random port for HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use streamforge_core::config::Config;
use streamforge_server::context::AppContext;
use streamforge_server::router::build_router;
use streamforge_server::spawn_background;
use streamforge_transcode::mock::MockWorkerFactory;

pub struct TestHarness {
    pub ctx: AppContext,
    pub factory: MockWorkerFactory,
    pub hls_root: TempDir,
    cancel: CancellationToken,
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Defaults suited to tests: no retention sweep, metrics on.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.cleanup.enabled = false;
    config.metrics.enabled = true;
    config
}

impl TestHarness {
    /// Must be called from within a tokio runtime.
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// `storage.hls_root` is always replaced with a fresh temp dir.
    pub fn with_config(mut config: Config) -> Self {
        let hls_root = tempfile::tempdir().expect("failed to create temp dir");
        config.storage.hls_root = hls_root.path().to_path_buf();

        let factory = MockWorkerFactory::new();
        let ctx = AppContext::new(config, Arc::new(factory.clone()))
            .expect("failed to build app context");
        let cancel = CancellationToken::new();
        spawn_background(&ctx, &cancel);

        Self {
            ctx,
            factory,
            hls_root,
            cancel,
        }
    }

    pub async fn with_server() -> (Self, SocketAddr) {
        Self::with_server_config(test_config()).await
    }

    pub async fn with_server_config(config: Config) -> (Self, SocketAddr) {
        let harness = Self::with_config(config);
        let app = build_router(harness.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (harness, addr)
    }
}

/// Poll `check` until it returns true or a couple of seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

/// Read a response body as JSON.
pub async fn json(resp: reqwest::Response) -> Value {
    resp.json().await.expect("response body is not JSON")
}
