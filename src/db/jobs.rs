//! Queries for the durable `jobs` queue.
//!
//! At-least-once semantics: a claim flips `waiting -> active` in one UPDATE,
//! a failing job is rescheduled with exponential backoff until attempts are
//! exhausted. Completed/failed rows are pruned to bounded tails.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::{JobRow, QueueCounts};
use crate::error::GroundswellError;

const JOB_COLUMNS: &str =
    "id, post_id, payload, state, attempts, max_attempts, run_at, last_error, created_at, updated_at";

/// Completed rows kept for inspection; older ones are pruned.
const KEEP_COMPLETED: i64 = 100;
/// Failed rows kept for inspection.
const KEEP_FAILED: i64 = 50;

pub async fn enqueue(
    pool: &SqlitePool,
    post_id: &str,
    payload: &str,
    max_attempts: i64,
    run_at_ms: i64,
) -> Result<i64, GroundswellError> {
    let now = Utc::now();
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO jobs (post_id, payload, state, attempts, max_attempts, run_at, created_at, updated_at)
        VALUES (?, ?, 'waiting', 0, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(post_id)
    .bind(payload)
    .bind(max_attempts)
    .bind(run_at_ms)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

/// Claims the oldest runnable job, flipping it to `active` atomically.
pub async fn claim_next(
    pool: &SqlitePool,
    now_ms: i64,
) -> Result<Option<JobRow>, GroundswellError> {
    let now = Utc::now();
    let row = sqlx::query_as::<_, JobRow>(&format!(
        r#"
        UPDATE jobs
        SET state = 'active', attempts = attempts + 1, updated_at = ?
        WHERE id = (
            SELECT id FROM jobs
            WHERE state = 'waiting' AND run_at <= ?
            ORDER BY id
            LIMIT 1
        )
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(now)
    .bind(now_ms)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn complete(pool: &SqlitePool, id: i64) -> Result<(), GroundswellError> {
    let now = Utc::now();
    sqlx::query("UPDATE jobs SET state = 'completed', updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    prune(pool, "completed", KEEP_COMPLETED).await
}

/// Records a failure. While attempts remain the job is rescheduled with
/// `backoff_ms * 2^(attempts-1)`; otherwise it lands in `failed`.
/// Returns whether the job will run again.
pub async fn fail(
    pool: &SqlitePool,
    job: &JobRow,
    error: &str,
    backoff_ms: u64,
    now_ms: i64,
) -> Result<bool, GroundswellError> {
    let now = Utc::now();

    if job.attempts < job.max_attempts {
        let exp = u32::try_from(job.attempts.max(1) - 1).unwrap_or(u32::MAX);
        let delay = backoff_ms.saturating_mul(2u64.saturating_pow(exp));
        let run_at = now_ms.saturating_add(i64::try_from(delay).unwrap_or(i64::MAX));

        sqlx::query(
            "UPDATE jobs SET state = 'waiting', run_at = ?, last_error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(run_at)
        .bind(error)
        .bind(now)
        .bind(job.id)
        .execute(pool)
        .await?;
        return Ok(true);
    }

    sqlx::query("UPDATE jobs SET state = 'failed', last_error = ?, updated_at = ? WHERE id = ?")
        .bind(error)
        .bind(now)
        .bind(job.id)
        .execute(pool)
        .await?;
    prune(pool, "failed", KEEP_FAILED).await?;
    Ok(false)
}

pub async fn counts(pool: &SqlitePool) -> Result<QueueCounts, GroundswellError> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT state, COUNT(*) FROM jobs GROUP BY state")
            .fetch_all(pool)
            .await?;

    let mut counts = QueueCounts::default();
    for (state, n) in rows {
        let n = u64::try_from(n).unwrap_or(0);
        match state.as_str() {
            "waiting" => counts.waiting = n,
            "active" => counts.active = n,
            "completed" => counts.completed = n,
            "failed" => counts.failed = n,
            _ => {}
        }
    }
    Ok(counts)
}

/// Post ids with a queue entry still pending or running; the refiller skips
/// these to avoid duplicate enqueues.
pub async fn in_flight_post_ids(pool: &SqlitePool) -> Result<Vec<String>, GroundswellError> {
    let ids: Vec<String> = sqlx::query_scalar(
        "SELECT DISTINCT post_id FROM jobs WHERE state IN ('waiting', 'active')",
    )
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

async fn prune(pool: &SqlitePool, state: &str, keep: i64) -> Result<(), GroundswellError> {
    sqlx::query(
        r#"
        DELETE FROM jobs
        WHERE state = ?
          AND id NOT IN (SELECT id FROM jobs WHERE state = ? ORDER BY id DESC LIMIT ?)
        "#,
    )
    .bind(state)
    .bind(state)
    .bind(keep)
    .execute(pool)
    .await?;
    Ok(())
}
