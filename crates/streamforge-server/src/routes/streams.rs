//! Stream management endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Extension;
use serde::{Deserialize, Serialize};

use streamforge_core::{validate_stream_key, StreamRecord};
use streamforge_transcode::WorkerStatus;

use crate::context::AppContext;
use crate::error::{ApiResponse, AppError};
use crate::middleware::request_id::RequestId;

#[derive(Debug, Serialize)]
pub struct StreamList {
    pub streams: Vec<StreamRecord>,
    pub total: usize,
}

/// GET /api/streams -- active streams, oldest first.
pub async fn list_streams(State(ctx): State<AppContext>) -> ApiResponse<StreamList> {
    let streams = ctx.supervisor.active_streams();
    ApiResponse::ok(StreamList {
        total: streams.len(),
        streams,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStats {
    pub active_streams: usize,
    pub max_streams: usize,
}

/// GET /api/streams/stats
pub async fn stream_stats(State(ctx): State<AppContext>) -> ApiResponse<StreamStats> {
    ApiResponse::ok(StreamStats {
        active_streams: ctx.supervisor.worker_count(),
        max_streams: ctx.supervisor.max_concurrent_streams(),
    })
}

#[derive(Debug, Serialize)]
pub struct StreamDetails {
    #[serde(flatten)]
    pub record: StreamRecord,
    pub worker: Option<WorkerStatus>,
}

/// GET /api/streams/{key}
pub async fn get_stream(
    State(ctx): State<AppContext>,
    Extension(request_id): Extension<RequestId>,
    Path(key): Path<String>,
) -> Result<ApiResponse<StreamDetails>, AppError> {
    let record = ctx
        .supervisor
        .stream_info(&key)
        .map_err(|e| AppError::new(e).with_request_id(request_id.0))?;
    let worker = ctx.supervisor.worker_status(&key);
    Ok(ApiResponse::ok(StreamDetails { record, worker }))
}

#[derive(Debug, Default, Deserialize)]
pub struct StartParams {
    pub profile: Option<String>,
}

/// POST /api/streams/{key}?profile= -- start transcoding without waiting
/// for an ingest callback.
pub async fn start_stream(
    State(ctx): State<AppContext>,
    Extension(request_id): Extension<RequestId>,
    Path(key): Path<String>,
    Query(params): Query<StartParams>,
) -> Result<ApiResponse<StreamRecord>, AppError> {
    let fail = |e: streamforge_core::Error| AppError::new(e).with_request_id(request_id.0.clone());
    validate_stream_key(&key).map_err(fail)?;
    let record = ctx
        .supervisor
        .start_stream(&key, params.profile.as_deref())
        .map_err(fail)?;
    Ok(ApiResponse::with_status(StatusCode::CREATED, record))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopResult {
    pub stream_key: String,
    /// Whether a worker was running when the request arrived.
    pub stopped: bool,
}

/// DELETE /api/streams/{key}
pub async fn stop_stream(
    State(ctx): State<AppContext>,
    Extension(request_id): Extension<RequestId>,
    Path(key): Path<String>,
) -> Result<ApiResponse<StopResult>, AppError> {
    let record = ctx
        .supervisor
        .stream_info(&key)
        .map_err(|e| AppError::new(e).with_request_id(request_id.0))?;
    let stopped = ctx.supervisor.stop_stream(&key);
    Ok(ApiResponse::ok(StopResult {
        stream_key: record.stream_key.to_string(),
        stopped,
    }))
}
