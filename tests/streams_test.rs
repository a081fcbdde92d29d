//! Integration tests for the stream management API.

mod common;

use common::{json, test_config, TestHarness};
use streamforge_core::StreamStatus;

#[tokio::test]
async fn list_starts_empty() {
    let (_h, addr) = TestHarness::with_server().await;

    let resp = reqwest::get(format!("http://{addr}/api/streams")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body = json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["total"], 0);
    assert_eq!(body["data"]["streams"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn start_list_and_stats() {
    let (h, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/api/streams/alpha"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body = json(resp).await;
    assert_eq!(body["data"]["streamKey"], "alpha");
    assert_eq!(body["data"]["status"], "active");
    assert_eq!(body["data"]["profile"], "adaptive");
    assert!(h.hls_root.path().join("alpha").is_dir());

    let body = json(reqwest::get(format!("http://{addr}/api/streams")).await.unwrap()).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["streams"][0]["streamKey"], "alpha");

    let body = json(
        reqwest::get(format!("http://{addr}/api/streams/stats"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["data"]["activeStreams"], 1);
    assert_eq!(body["data"]["maxStreams"], 10);
}

#[tokio::test]
async fn get_stream_includes_worker_status() {
    let (h, addr) = TestHarness::with_server().await;
    h.ctx.supervisor.start_stream("alpha", Some("low_latency")).unwrap();

    let resp = reqwest::get(format!("http://{addr}/api/streams/alpha")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body = json(resp).await;
    assert_eq!(body["data"]["profile"], "low_latency");
    assert_eq!(body["data"]["worker"]["running"], true);
}

#[tokio::test]
async fn get_unknown_stream_is_404() {
    let (_h, addr) = TestHarness::with_server().await;

    let resp = reqwest::get(format!("http://{addr}/api/streams/ghost")).await.unwrap();
    assert_eq!(resp.status(), 404);
    let body = json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn start_with_profile_query() {
    let (h, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/api/streams/alpha?profile=low_latency"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let handle = h.factory.latest("alpha").unwrap();
    assert!(handle.spec().args.iter().any(|a| a == "-hls_time"));
    assert_eq!(
        h.ctx.supervisor.stream_info("alpha").unwrap().profile,
        "low_latency"
    );
}

#[tokio::test]
async fn start_rejects_unknown_profile_and_bad_key() {
    let (h, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/api/streams/alpha?profile=ultra"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(json(resp).await["error"]["code"], "UNKNOWN_PROFILE");

    let resp = client
        .post(format!("http://{addr}/api/streams/ab"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(json(resp).await["error"]["code"], "VALIDATION_ERROR");

    assert_eq!(h.factory.created_count(), 0);
}

#[tokio::test]
async fn limit_is_enforced_over_http() {
    let mut config = test_config();
    config.transcoding.max_concurrent_streams = 1;
    let (_h, addr) = TestHarness::with_server_config(config).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/api/streams/alpha"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let resp = client
        .post(format!("http://{addr}/api/streams/beta"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 429);
    let body = json(resp).await;
    assert_eq!(body["error"]["code"], "STREAM_LIMIT_EXCEEDED");
    assert_eq!(body["error"]["message"], "Maximum 1 concurrent streams allowed");

    // Same key again is idempotent.
    let resp = client
        .post(format!("http://{addr}/api/streams/alpha"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
}

#[tokio::test]
async fn delete_stops_stream() {
    let (h, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();
    h.ctx.supervisor.start_stream("alpha", None).unwrap();

    let resp = client
        .delete(format!("http://{addr}/api/streams/alpha"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body = json(resp).await;
    assert_eq!(body["data"]["streamKey"], "alpha");
    assert_eq!(body["data"]["stopped"], true);

    assert_eq!(h.ctx.supervisor.worker_count(), 0);
    assert_eq!(
        h.ctx.supervisor.stream_info("alpha").unwrap().status,
        StreamStatus::Stopped
    );
    assert_eq!(h.factory.latest("alpha").unwrap().stop_calls(), 1);

    // Second delete finds the record but nothing running.
    let resp = client
        .delete(format!("http://{addr}/api/streams/alpha"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(json(resp).await["data"]["stopped"], false);
}

#[tokio::test]
async fn delete_unknown_is_404() {
    let (_h, addr) = TestHarness::with_server().await;
    let resp = reqwest::Client::new()
        .delete(format!("http://{addr}/api/streams/ghost"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    assert_eq!(json(resp).await["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn stream_ops_are_rate_limited() {
    let mut config = test_config();
    config.rate_limit.stream_ops_per_minute = 2;
    let (_h, addr) = TestHarness::with_server_config(config).await;
    let client = reqwest::Client::new();

    for _ in 0..2 {
        let resp = client
            .delete(format!("http://{addr}/api/streams/ghost"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
    }
    let resp = client
        .delete(format!("http://{addr}/api/streams/ghost"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 429);
    assert_eq!(json(resp).await["error"]["code"], "RATE_LIMIT_EXCEEDED");

    // Reads are not subject to the stream-ops quota.
    let resp = client
        .get(format!("http://{addr}/api/streams"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn api_key_guards_stream_routes() {
    let mut config = test_config();
    config.security.api_key = Some("s3cret".into());
    let (_h, addr) = TestHarness::with_server_config(config).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{addr}/api/streams"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    assert_eq!(json(resp).await["error"]["code"], "AUTHENTICATION_ERROR");

    let resp = client
        .get(format!("http://{addr}/api/streams"))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .get(format!("http://{addr}/api/streams"))
        .bearer_auth("s3cret")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .get(format!("http://{addr}/api/streams"))
        .header("x-api-key", "s3cret")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Health stays public.
    let resp = client
        .get(format!("http://{addr}/api/health/live"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn responses_carry_request_id() {
    let (_h, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{addr}/api/streams"))
        .header("x-request-id", "abc-123")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.headers()["x-request-id"], "abc-123");

    let resp = client
        .get(format!("http://{addr}/api/streams"))
        .send()
        .await
        .unwrap();
    assert!(resp.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn unknown_route_is_404_envelope() {
    let (_h, addr) = TestHarness::with_server().await;
    let resp = reqwest::get(format!("http://{addr}/api/nope")).await.unwrap();
    assert_eq!(resp.status(), 404);
    let body = json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn service_info_lists_profiles() {
    let (_h, addr) = TestHarness::with_server().await;
    let body = json(reqwest::get(format!("http://{addr}/")).await.unwrap()).await;
    assert_eq!(body["data"]["name"], "streamforge");
    let profiles = body["data"]["profiles"].as_array().unwrap();
    assert!(profiles.iter().any(|p| p == "adaptive"));
    assert!(profiles.iter().any(|p| p == "low_latency"));
    assert_eq!(body["data"]["endpoints"]["streams"], "/api/streams");
}
