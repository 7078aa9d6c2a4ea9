//! HTTP Server & Routing Integration Tests

mod helpers;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use helpers::*;
use tphysio_ai::{build_router, AppState};

fn test_app_state() -> AppState {
    AppState::new(orchestrator(
        FakeWeather::sunny(),
        FakeElevation::accurate(),
        ScriptedGenerator::answering("tier-a", "## Report"),
        &fast_config(),
    ))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// TC-HTTP-001: Health endpoint reports module and job count
#[tokio::test]
async fn tc_http_001_health() {
    let app = build_router(test_app_state());

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "tphysio-ai");
    assert_eq!(body["jobs_total"], 0);
}

/// TC-HTTP-002: Start returns 202 with `jobId`, status is then pollable
#[tokio::test]
async fn tc_http_002_start_then_poll() {
    let state = test_app_state();
    let app = build_router(state.clone());

    let input = serde_json::to_value(sample_input(sample_series(120, Some(5.0)))).unwrap();
    let response = app
        .clone()
        .oneshot(post_json("/api/process/start", input))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body = body_json(response).await;
    assert!(body.get("job_id").is_none());
    let job_id: uuid::Uuid = serde_json::from_value(body["jobId"].clone()).unwrap();

    state.orchestrator.wait_for(job_id).await.unwrap();

    let response = app
        .oneshot(get(&format!("/api/process/status/{}", job_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["progress"], 100);
    assert!(body["error"].is_null());
    assert_eq!(body["result"]["analysisText"], "## Report");
    assert_eq!(body["result"]["decouplingChartData"].as_array().unwrap().len(), 5);
}

/// TC-HTTP-003: Validation failures are 400 with the standard error body
#[tokio::test]
async fn tc_http_003_invalid_profile_rejected() {
    let state = test_app_state();
    let app = build_router(state.clone());

    let mut input = serde_json::to_value(sample_input(sample_series(120, None))).unwrap();
    input["formData"]["profile"]["hrRest"] = Value::Null;

    let response = app.oneshot(post_json("/api/process/start", input)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert_eq!(state.orchestrator.job_count(), 0);
}

/// TC-HTTP-004: Unknown job status is 404
#[tokio::test]
async fn tc_http_004_unknown_job_404() {
    let app = build_router(test_app_state());

    let response = app
        .oneshot(get(&format!("/api/process/status/{}", uuid::Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

/// TC-HTTP-005: Cancel requires a job id and acknowledges the outcome
#[tokio::test]
async fn tc_http_005_cancel() {
    let state = test_app_state();
    let app = build_router(state.clone());

    let response = app
        .clone()
        .oneshot(post_json("/api/process/cancel", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/process/cancel",
            json!({ "job_id": uuid::Uuid::new_v4() }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["success"], false);

    let job_id = state
        .orchestrator
        .create_job(sample_input(sample_series(120, None)))
        .unwrap();
    let response = app
        .oneshot(post_json("/api/process/cancel", json!({ "jobId": job_id })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["success"], true);

    let job = state.orchestrator.wait_for(job_id).await.unwrap();
    assert_eq!(job.status, tphysio_ai::models::JobStatus::Cancelled);
}

/// TC-HTTP-006: Event stream route answers with text/event-stream
#[tokio::test]
async fn tc_http_006_event_stream_content_type() {
    let app = build_router(test_app_state());

    let response = app.oneshot(get("/api/process/events")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get(header::CONTENT_TYPE).unwrap();
    assert!(content_type.to_str().unwrap().starts_with("text/event-stream"));
}
