//! Queries for the `categories` table.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::CategoryRow;
use crate::error::GroundswellError;

/// Find-or-create, unique by name. The upsert keeps the first description
/// and parent; repeated references never fork a duplicate.
pub async fn find_or_create(
    pool: &SqlitePool,
    name: &str,
    description: &str,
    parent_id: Option<i64>,
) -> Result<i64, GroundswellError> {
    let now = Utc::now();
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO categories (name, description, parent_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(name) DO UPDATE SET updated_at = excluded.updated_at
        RETURNING id
        "#,
    )
    .bind(name)
    .bind(description)
    .bind(parent_id)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

pub async fn list_names(pool: &SqlitePool) -> Result<Vec<String>, GroundswellError> {
    let names: Vec<String> = sqlx::query_scalar("SELECT name FROM categories ORDER BY name")
        .fetch_all(pool)
        .await?;
    Ok(names)
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Option<CategoryRow>, GroundswellError> {
    let row = sqlx::query_as::<_, CategoryRow>(
        "SELECT id, name, description, parent_id, created_at, updated_at FROM categories WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}
