//! Row types returned by the database actor.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::model::{Classification, PostStatus, RawPost, SentimentLabel};

/// Full post row: raw ingest fields plus enrichment state.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PostRow {
    pub id: String,
    pub source: String,
    pub sub_source: String,
    pub title: String,
    pub body: String,
    pub author: String,
    pub score: i64,
    pub url: String,
    pub metadata: Option<String>,
    pub parent_id: Option<String>,
    pub created_at: i64,
    pub status: String,
    pub is_spam: Option<bool>,
    pub has_pii: Option<bool>,
    pub moderation_notes: Option<String>,
    pub is_valid: Option<bool>,
    pub validity_reason: Option<String>,
    pub classification: Option<String>,
    pub classification_confidence: Option<f64>,
    pub summary: Option<String>,
    pub keywords: Option<String>,
    pub embedding: Option<Vec<u8>>,
    pub sentiment_label: Option<String>,
    pub sentiment_score: Option<f64>,
    pub category_id: Option<i64>,
    pub cluster_id: Option<i64>,
    pub retry_count: i64,
    pub error_message: Option<String>,
    pub inserted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

impl PostRow {
    pub fn status(&self) -> Option<PostStatus> {
        PostStatus::parse(&self.status)
    }

    pub fn classification(&self) -> Option<Classification> {
        self.classification
            .as_deref()
            .map(Classification::parse_lenient)
    }

    pub fn sentiment(&self) -> Option<SentimentLabel> {
        self.sentiment_label
            .as_deref()
            .map(SentimentLabel::parse_lenient)
    }

    /// Reconstructs the ingest unit for re-enqueueing.
    pub fn to_raw(&self) -> RawPost {
        RawPost {
            id: self.id.clone(),
            source: self.source.clone(),
            title: self.title.clone(),
            body: self.body.clone(),
            author: self.author.clone(),
            score: self.score,
            url: self.url.clone(),
            sub_source: self.sub_source.clone(),
            created_at: self.created_at,
            metadata: self
                .metadata
                .as_deref()
                .and_then(|m| serde_json::from_str(m).ok())
                .unwrap_or(serde_json::Value::Null),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CategoryRow {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub parent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ClusterRow {
    pub id: i64,
    pub name: String,
    pub centroid: Vec<u8>,
    pub member_count: i64,
    pub category_id: Option<i64>,
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ClusterRow {
    pub fn centroid_vec(&self) -> Vec<f32> {
        crate::cluster::vector::from_blob(&self.centroid)
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MentionRow {
    pub id: i64,
    pub post_id: String,
    pub cluster_id: i64,
    pub category_id: Option<i64>,
    pub sentiment_score: Option<f64>,
    pub engagement_score: f64,
    pub mentioned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: i64,
    pub post_id: String,
    pub payload: String,
    pub state: String,
    pub attempts: i64,
    pub max_attempts: i64,
    pub run_at: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRow {
    pub fn raw_post(&self) -> Result<RawPost, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}

/// Queue depth snapshot exposed at `/api/queue/status`.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct QueueCounts {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Post embedding with its current assignment, for outlier reassignment.
#[derive(Debug, Clone, FromRow)]
pub struct PostEmbeddingRow {
    pub id: String,
    pub cluster_id: Option<i64>,
    pub embedding: Vec<u8>,
}
