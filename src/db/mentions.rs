//! Queries for `mentions`, `trends` and `audit_log`.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::GroundswellError;

/// Appends one mention row. Mentions are never updated or deleted except by
/// cluster merges.
pub async fn insert(
    pool: &SqlitePool,
    post_id: &str,
    cluster_id: i64,
    category_id: Option<i64>,
    sentiment_score: Option<f64>,
    engagement_score: f64,
) -> Result<i64, GroundswellError> {
    let now = Utc::now();
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO mentions (post_id, cluster_id, category_id, sentiment_score, engagement_score, mentioned_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(post_id)
    .bind(cluster_id)
    .bind(category_id)
    .bind(sentiment_score)
    .bind(engagement_score)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

pub async fn count_for_post(pool: &SqlitePool, post_id: &str) -> Result<i64, GroundswellError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mentions WHERE post_id = ?")
        .bind(post_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Moves mentions between clusters during a merge.
pub async fn reassign_cluster(
    pool: &SqlitePool,
    from: i64,
    to: i64,
) -> Result<u64, GroundswellError> {
    let res = sqlx::query("UPDATE mentions SET cluster_id = ? WHERE cluster_id = ?")
        .bind(to)
        .bind(from)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

/// Upsert used by the periodic trend scorer (interaction contract only).
pub async fn record_trend_point(
    pool: &SqlitePool,
    cluster_id: i64,
    bucket_start: DateTime<Utc>,
    mention_count: i64,
    avg_sentiment: Option<f64>,
    trend_score: Option<f64>,
) -> Result<(), GroundswellError> {
    sqlx::query(
        r#"
        INSERT INTO trends (cluster_id, bucket_start, mention_count, avg_sentiment, trend_score)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(cluster_id, bucket_start) DO UPDATE SET
            mention_count = excluded.mention_count,
            avg_sentiment = excluded.avg_sentiment,
            trend_score = excluded.trend_score
        "#,
    )
    .bind(cluster_id)
    .bind(bucket_start)
    .bind(mention_count)
    .bind(avg_sentiment)
    .bind(trend_score)
    .execute(pool)
    .await?;
    Ok(())
}

/// One audit row per stage execution.
pub async fn insert_audit(
    pool: &SqlitePool,
    post_id: &str,
    stage: &str,
    success: bool,
    error: Option<&str>,
    latency_ms: i64,
    tokens_used: i64,
) -> Result<(), GroundswellError> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO audit_log (post_id, stage, success, error, latency_ms, tokens_used, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(post_id)
    .bind(stage)
    .bind(success)
    .bind(error)
    .bind(latency_ms)
    .bind(tokens_used)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}
