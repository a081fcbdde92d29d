use axum::extract::State;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::context::AppContext;
use crate::error::ApiResponse;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub profiles: Vec<String>,
    pub endpoints: BTreeMap<&'static str, &'static str>,
}

/// GET / -- service name, version and endpoint map.
pub async fn service_info(State(ctx): State<AppContext>) -> ApiResponse<ServiceInfo> {
    let endpoints = BTreeMap::from([
        ("health", "/api/health"),
        ("streams", "/api/streams"),
        ("events", "/api/events"),
        ("metrics", "/api/metrics"),
        ("ingest", "/api/ingest/publish"),
        ("hls", "/hls/{key}/master.m3u8"),
    ]);
    ApiResponse::ok(ServiceInfo {
        name: "streamforge",
        version: env!("CARGO_PKG_VERSION"),
        profiles: ctx
            .supervisor
            .registry()
            .names()
            .into_iter()
            .map(String::from)
            .collect(),
        endpoints,
    })
}
