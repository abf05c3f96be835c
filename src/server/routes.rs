//! Route handlers for the enrichment ingress.

use crate::error::GroundswellError;
use crate::metrics::StageSnapshot;
use crate::model::RawPost;
use crate::server::router::AppState;
use axum::{Json, extract::State};
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub environment: String,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().to_rfc3339(),
        environment: state.environment.to_string(),
    })
}

#[derive(Deserialize)]
pub struct ProcessPostRequest {
    pub post: RawPost,
}

#[derive(Serialize)]
pub struct ProcessPostResponse {
    pub success: bool,
    #[serde(rename = "postId")]
    pub post_id: String,
}

fn validate(post: &RawPost) -> Result<(), GroundswellError> {
    if post.id.trim().is_empty() {
        return Err(GroundswellError::InvalidRequest(
            "post.id is required".to_string(),
        ));
    }
    if post.title.trim().is_empty() && post.body.trim().is_empty() {
        return Err(GroundswellError::InvalidRequest(
            "post.title or post.body is required".to_string(),
        ));
    }
    Ok(())
}

/// Async ingestion: validate, enqueue, return immediately.
pub async fn process_post(
    State(state): State<AppState>,
    Json(request): Json<ProcessPostRequest>,
) -> Result<Json<ProcessPostResponse>, GroundswellError> {
    validate(&request.post)?;

    state.db.upsert_raw_post(request.post.clone(), None).await?;
    state.queue.enqueue(&request.post).await?;

    Ok(Json(ProcessPostResponse {
        success: true,
        post_id: request.post.id,
    }))
}

#[derive(Serialize)]
pub struct ProcessPostSyncResponse {
    pub success: bool,
    #[serde(rename = "postId")]
    pub post_id: String,
    pub outcome: String,
}

/// Synchronous ingestion: run the full pipeline inline; 500 on failure.
pub async fn process_post_sync(
    State(state): State<AppState>,
    Json(request): Json<ProcessPostRequest>,
) -> Result<Json<ProcessPostSyncResponse>, GroundswellError> {
    validate(&request.post)?;

    let outcome = state.pipeline.run(&request.post).await?;
    Ok(Json(ProcessPostSyncResponse {
        success: true,
        post_id: request.post.id,
        outcome: format!("{outcome:?}"),
    }))
}

pub async fn queue_status(
    State(state): State<AppState>,
) -> Result<Json<crate::db::QueueCounts>, GroundswellError> {
    Ok(Json(state.queue.counts().await?))
}

pub async fn metrics_snapshot(State(state): State<AppState>) -> Json<Vec<StageSnapshot>> {
    Json(state.metrics.snapshot())
}
