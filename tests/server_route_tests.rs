mod common;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header::CONTENT_TYPE};
use common::{FakeLlm, build_pipeline, cleanup_database, faucet_post, temp_database_url};
use groundswell::queue::JobQueue;
use groundswell::server::{AppState, groundswell_router};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

async fn test_app(tag: &str) -> (std::path::PathBuf, axum::Router, groundswell::db::DbHandle) {
    let (db_path, url) = temp_database_url(tag);
    let db = groundswell::db::spawn(&url).await;
    let (pipeline, metrics, _registry) = build_pipeline(db.clone(), FakeLlm::default()).await;
    let queue = Arc::new(JobQueue::new(db.clone(), 3, 1000));

    let state = AppState::new(db.clone(), queue, pipeline, metrics, "test");
    (db_path, groundswell_router(state), db)
}

fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_environment() {
    let (db_path, app, _db) = test_app("health").await;

    let resp = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["environment"], "test");
    assert!(body["timestamp"].is_string());

    cleanup_database(&db_path).await;
}

#[tokio::test]
async fn process_post_enqueues_and_returns_id() {
    let (db_path, app, db) = test_app("enqueue").await;

    let post = faucet_post();
    let resp = app
        .oneshot(json_request(
            "/api/process-post",
            json!({ "post": post }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["postId"], post.id);

    let counts = db.job_counts().await.unwrap();
    assert_eq!(counts.waiting, 1);

    cleanup_database(&db_path).await;
}

#[tokio::test]
async fn process_post_rejects_empty_content() {
    let (db_path, app, _db) = test_app("reject").await;

    let mut post = faucet_post();
    post.title = String::new();
    post.body = String::new();

    let resp = app
        .oneshot(json_request(
            "/api/process-post",
            json!({ "post": post }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body = body_json(resp).await;
    assert_eq!(body["error"], "INVALID_REQUEST");
    assert!(body["message"].is_string());

    cleanup_database(&db_path).await;
}

#[tokio::test]
async fn process_post_sync_runs_pipeline_inline() {
    let (db_path, app, db) = test_app("sync").await;

    let post = faucet_post();
    let resp = app
        .oneshot(json_request(
            "/api/process-post-sync",
            json!({ "post": post }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let row = db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(row.status.as_str(), "processed");
    assert_eq!(db.count_mentions(&post.id).await.unwrap(), 1);

    cleanup_database(&db_path).await;
}

#[tokio::test]
async fn queue_status_exposes_counts() {
    let (db_path, app, db) = test_app("status").await;

    db.enqueue_job("p1", "{}", 3, 0).await.unwrap();

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/queue/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp).await;
    assert_eq!(body["waiting"], 1);
    assert_eq!(body["active"], 0);

    cleanup_database(&db_path).await;
}

#[tokio::test]
async fn metrics_route_reports_stage_counters() {
    let (db_path, app, _db) = test_app("metrics").await;

    // Run one post inline so counters exist, then read them back.
    let resp = app
        .clone()
        .oneshot(json_request(
            "/api/process-post-sync",
            json!({ "post": faucet_post() }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp).await;
    let stages: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["stage"].as_str().unwrap())
        .collect();
    assert!(stages.contains(&"spam_check"));
    assert!(stages.contains(&"record_mention"));

    cleanup_database(&db_path).await;
}

#[tokio::test]
async fn unknown_route_is_404() {
    let (db_path, app, _db) = test_app("fallback").await;

    let resp = app
        .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    cleanup_database(&db_path).await;
}
