//! Axum router construction.
//!
//! Builds the application router with all route groups, middleware layers,
//! and static HLS serving.

use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::context::AppContext;
use crate::error::ApiResponse;
use crate::middleware::auth::auth_middleware;
use crate::middleware::rate_limit::rate_limit_middleware;
use crate::middleware::request_id::request_id_middleware;
use crate::routes;

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Start and stop share a tighter quota than the rest of the API.
    let stream_ops = post(routes::streams::start_stream)
        .delete(routes::streams::stop_stream)
        .layer::<_, std::convert::Infallible>(middleware::from_fn(rate_limit_middleware))
        .layer::<_, std::convert::Infallible>(Extension(ctx.stream_limiter.clone()));

    let stream_routes = Router::new()
        .route("/streams", get(routes::streams::list_streams))
        .route("/streams/stats", get(routes::streams::stream_stats))
        .route(
            "/streams/{key}",
            get(routes::streams::get_stream).merge(stream_ops),
        )
        .layer(middleware::from_fn_with_state(ctx.clone(), auth_middleware));

    let api = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/health/ready", get(routes::health::readiness))
        .route("/health/live", get(routes::health::liveness))
        .route("/events", get(routes::events::events_handler))
        .route("/metrics", get(routes::metrics::metrics_handler))
        .route("/ingest/publish", post(routes::ingest::publish))
        .route(
            "/ingest/publish/confirmed",
            post(routes::ingest::publish_confirmed),
        )
        .route("/ingest/publish/done", post(routes::ingest::publish_done))
        .merge(stream_routes)
        .layer(middleware::from_fn(rate_limit_middleware))
        .layer(Extension(ctx.api_limiter.clone()));

    let hls = ServeDir::new(&ctx.config.storage.hls_root);

    Router::new()
        .route("/", get(routes::info::service_info))
        .nest("/api", api)
        .nest_service("/hls", hls)
        .fallback(not_found)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn not_found() -> impl IntoResponse {
    ApiResponse::failure(StatusCode::NOT_FOUND, "NOT_FOUND", "Route not found")
}
