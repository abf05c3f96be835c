//! Queries for the `posts` table.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::{PostEmbeddingRow, PostRow};
use crate::error::GroundswellError;
use crate::model::{PostStatus, RawPost};

const POST_COLUMNS: &str = r#"
    id, source, sub_source, title, body, author, score, url, metadata,
    parent_id, created_at, status, is_spam, has_pii, moderation_notes,
    is_valid, validity_reason, classification, classification_confidence,
    summary, keywords, embedding, sentiment_label, sentiment_score,
    category_id, cluster_id, retry_count, error_message, inserted_at,
    updated_at, processing_started_at, processed_at, failed_at
"#;

/// Inserts a raw post as `unprocessed`. The raw fields are immutable; a
/// conflicting id is left untouched so re-harvesting never clobbers
/// enrichment state.
pub async fn upsert_raw(
    pool: &SqlitePool,
    post: &RawPost,
    parent_id: Option<&str>,
) -> Result<bool, GroundswellError> {
    let now = Utc::now();
    let metadata = serde_json::to_string(&post.metadata)?;

    let res = sqlx::query(
        r#"
        INSERT INTO posts (
            id, source, sub_source, title, body, author, score, url, metadata,
            parent_id, created_at, status, inserted_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'unprocessed', ?, ?)
        ON CONFLICT(id) DO NOTHING
        "#,
    )
    .bind(&post.id)
    .bind(&post.source)
    .bind(&post.sub_source)
    .bind(&post.title)
    .bind(&post.body)
    .bind(&post.author)
    .bind(post.score)
    .bind(&post.url)
    .bind(metadata)
    .bind(parent_id)
    .bind(post.created_at)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(res.rows_affected() == 1)
}

pub async fn get(pool: &SqlitePool, id: &str) -> Result<Option<PostRow>, GroundswellError> {
    let row = sqlx::query_as::<_, PostRow>(&format!(
        "SELECT {POST_COLUMNS} FROM posts WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Atomic lock acquisition: transitions to `processing` only from
/// `unprocessed`, or from `failed` while retries remain. Returns whether this
/// caller won the lock. Exactly one caller wins per epoch.
pub async fn acquire_lock(
    pool: &SqlitePool,
    id: &str,
    max_retries: i64,
) -> Result<bool, GroundswellError> {
    let now = Utc::now();
    let res = sqlx::query(
        r#"
        UPDATE posts
        SET status = 'processing', processing_started_at = ?, updated_at = ?
        WHERE id = ?
          AND (status = 'unprocessed' OR (status = 'failed' AND retry_count < ?))
        "#,
    )
    .bind(now)
    .bind(now)
    .bind(id)
    .bind(max_retries)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() == 1)
}

/// Terminal success transition.
pub async fn mark_processed(pool: &SqlitePool, id: &str) -> Result<(), GroundswellError> {
    let now = Utc::now();
    sqlx::query(
        r#"
        UPDATE posts
        SET status = 'processed', processed_at = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(now)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Failure transition: records the error and bumps the retry count in one
/// statement so concurrent releases can't lose an increment.
pub async fn mark_failed(
    pool: &SqlitePool,
    id: &str,
    error: &str,
) -> Result<(), GroundswellError> {
    let now = Utc::now();
    sqlx::query(
        r#"
        UPDATE posts
        SET status = 'failed', failed_at = ?, updated_at = ?,
            retry_count = retry_count + 1, error_message = ?
        WHERE id = ?
        "#,
    )
    .bind(now)
    .bind(now)
    .bind(error)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Oldest-first batch of posts still waiting for enrichment.
pub async fn fetch_unprocessed(
    pool: &SqlitePool,
    limit: i64,
) -> Result<Vec<PostRow>, GroundswellError> {
    let rows = sqlx::query_as::<_, PostRow>(&format!(
        "SELECT {POST_COLUMNS} FROM posts WHERE status = 'unprocessed' ORDER BY created_at LIMIT ?"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// All post ids for one source, one pass. Seeds the dedup index on boot.
pub async fn list_ids(pool: &SqlitePool, source: &str) -> Result<Vec<String>, GroundswellError> {
    let ids: Vec<String> =
        sqlx::query_scalar("SELECT id FROM posts WHERE source = ? AND parent_id IS NULL")
            .bind(source)
            .fetch_all(pool)
            .await?;
    Ok(ids)
}

pub async fn count_by_status(
    pool: &SqlitePool,
    status: PostStatus,
) -> Result<i64, GroundswellError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE status = ?")
        .bind(status.as_str())
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Embeddings of processed posts with their cluster assignment.
pub async fn list_processed_embeddings(
    pool: &SqlitePool,
) -> Result<Vec<PostEmbeddingRow>, GroundswellError> {
    let rows = sqlx::query_as::<_, PostEmbeddingRow>(
        r#"
        SELECT id, cluster_id, embedding
        FROM posts
        WHERE status = 'processed' AND embedding IS NOT NULL
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Embeddings of members of one cluster (centroid recomputation).
pub async fn list_cluster_member_embeddings(
    pool: &SqlitePool,
    cluster_id: i64,
) -> Result<Vec<Vec<u8>>, GroundswellError> {
    let rows: Vec<Vec<u8>> = sqlx::query_scalar(
        "SELECT embedding FROM posts WHERE cluster_id = ? AND embedding IS NOT NULL",
    )
    .bind(cluster_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Moves every post of `from` into `to` (cluster merge).
pub async fn reassign_cluster(
    pool: &SqlitePool,
    from: i64,
    to: i64,
) -> Result<u64, GroundswellError> {
    let now = Utc::now();
    let res = sqlx::query("UPDATE posts SET cluster_id = ?, updated_at = ? WHERE cluster_id = ?")
        .bind(to)
        .bind(now)
        .bind(from)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

/// Repoints a single post's cluster (outlier reassignment).
pub async fn set_cluster(
    pool: &SqlitePool,
    post_id: &str,
    cluster_id: i64,
) -> Result<(), GroundswellError> {
    let now = Utc::now();
    sqlx::query("UPDATE posts SET cluster_id = ?, updated_at = ? WHERE id = ?")
        .bind(cluster_id)
        .bind(now)
        .bind(post_id)
        .execute(pool)
        .await?;
    Ok(())
}
