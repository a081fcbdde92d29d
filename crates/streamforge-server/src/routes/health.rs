//! Health, readiness and liveness probes.

use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

use crate::context::AppContext;
use crate::error::ApiResponse;

const PROBE_FILE: &str = ".health-check";

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub storage: bool,
    pub supervisor: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub active_streams: usize,
    pub max_streams: usize,
    pub checks: HealthChecks,
}

/// Write and remove a probe file under the HLS root.
async fn storage_writable(ctx: &AppContext) -> bool {
    let probe = ctx.config.storage.hls_root.join(PROBE_FILE);
    match tokio::fs::write(&probe, b"ok").await {
        Ok(()) => {
            let _ = tokio::fs::remove_file(&probe).await;
            true
        }
        Err(e) => {
            tracing::warn!(path = %probe.display(), "Storage health check failed: {e}");
            false
        }
    }
}

/// GET /api/health
pub async fn health_check(State(ctx): State<AppContext>) -> ApiResponse<HealthReport> {
    let checks = HealthChecks {
        storage: storage_writable(&ctx).await,
        supervisor: ctx.supervisor.is_healthy(),
    };
    let healthy = checks.storage && checks.supervisor;
    let report = HealthReport {
        status: if healthy { "healthy" } else { "unhealthy" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: ctx.started_at.elapsed().as_secs(),
        active_streams: ctx.supervisor.worker_count(),
        max_streams: ctx.supervisor.max_concurrent_streams(),
        checks,
    };
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    ApiResponse::with_status(status, report)
}

#[derive(Debug, Serialize)]
pub struct Readiness {
    pub ready: bool,
}

/// GET /api/health/ready
pub async fn readiness(State(ctx): State<AppContext>) -> ApiResponse<Readiness> {
    let ready = ctx.config.storage.hls_root.is_dir() && ctx.supervisor.is_healthy();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    ApiResponse::with_status(status, Readiness { ready })
}

#[derive(Debug, Serialize)]
pub struct Liveness {
    pub alive: bool,
}

/// GET /api/health/live
pub async fn liveness() -> ApiResponse<Liveness> {
    ApiResponse::ok(Liveness { alive: true })
}
