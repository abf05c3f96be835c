//! Queries for the `clusters` table.
//!
//! Centroid writes are single UPDATE statements: the registry actor
//! serializes concurrent assignments to the same cluster, and the statement
//! itself carries both the new centroid and the new member count so a
//! partial write can't be observed.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::ClusterRow;
use crate::error::GroundswellError;

const CLUSTER_COLUMNS: &str =
    "id, name, centroid, member_count, category_id, metadata, created_at, updated_at";

pub async fn insert(
    pool: &SqlitePool,
    name: &str,
    centroid: &[u8],
    category_id: Option<i64>,
) -> Result<i64, GroundswellError> {
    let now = Utc::now();
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO clusters (name, centroid, member_count, category_id, created_at, updated_at)
        VALUES (?, ?, 1, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(name)
    .bind(centroid)
    .bind(category_id)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

pub async fn list(pool: &SqlitePool) -> Result<Vec<ClusterRow>, GroundswellError> {
    let rows =
        sqlx::query_as::<_, ClusterRow>(&format!("SELECT {CLUSTER_COLUMNS} FROM clusters"))
            .fetch_all(pool)
            .await?;
    Ok(rows)
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Option<ClusterRow>, GroundswellError> {
    let row = sqlx::query_as::<_, ClusterRow>(&format!(
        "SELECT {CLUSTER_COLUMNS} FROM clusters WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Writes centroid and member count together.
pub async fn update_centroid(
    pool: &SqlitePool,
    id: i64,
    centroid: &[u8],
    member_count: i64,
) -> Result<(), GroundswellError> {
    let now = Utc::now();
    let res = sqlx::query(
        "UPDATE clusters SET centroid = ?, member_count = ?, updated_at = ? WHERE id = ?",
    )
    .bind(centroid)
    .bind(member_count)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(GroundswellError::Unexpected(format!(
            "cluster not found for centroid update: {id}"
        )));
    }
    Ok(())
}

pub async fn delete(pool: &SqlitePool, id: i64) -> Result<(), GroundswellError> {
    sqlx::query("DELETE FROM clusters WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
