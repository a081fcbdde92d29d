//! Prometheus metrics endpoint.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;

use crate::context::AppContext;

/// GET /api/metrics -- Prometheus text format. Empty when metrics are off.
pub async fn metrics_handler(State(ctx): State<AppContext>) -> impl IntoResponse {
    let body = match &ctx.metrics {
        Some(metrics) => {
            metrics.set_active(ctx.supervisor.worker_count());
            metrics.render()
        }
        None => String::new(),
    };
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}
