//! Stage write-through patches for the `posts` table.
//!
//! Each enrichment stage writes only the columns it owns; unset fields are
//! left untouched via COALESCE. Fields are set once per successful pipeline
//! execution, so a patch never needs to clear a column.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::GroundswellError;
use crate::model::{Classification, SentimentLabel};

#[derive(Debug, Clone, Default)]
pub struct PostPatch {
    pub is_spam: Option<bool>,
    pub has_pii: Option<bool>,
    pub moderation_notes: Option<String>,
    pub is_valid: Option<bool>,
    pub validity_reason: Option<String>,
    pub classification: Option<Classification>,
    pub classification_confidence: Option<f64>,
    pub summary: Option<String>,
    /// JSON-encoded array of keyword strings.
    pub keywords: Option<String>,
    /// Little-endian f32 BLOB.
    pub embedding: Option<Vec<u8>>,
    pub sentiment_label: Option<SentimentLabel>,
    pub sentiment_score: Option<f64>,
    pub category_id: Option<i64>,
    pub cluster_id: Option<i64>,
    pub error_message: Option<String>,
}

impl PostPatch {
    pub async fn apply(&self, pool: &SqlitePool, post_id: &str) -> Result<(), GroundswellError> {
        let updated_at = Utc::now();

        let res = sqlx::query(
            r#"
            UPDATE posts
            SET
                is_spam = COALESCE(?, is_spam),
                has_pii = COALESCE(?, has_pii),
                moderation_notes = COALESCE(?, moderation_notes),
                is_valid = COALESCE(?, is_valid),
                validity_reason = COALESCE(?, validity_reason),
                classification = COALESCE(?, classification),
                classification_confidence = COALESCE(?, classification_confidence),
                summary = COALESCE(?, summary),
                keywords = COALESCE(?, keywords),
                embedding = COALESCE(?, embedding),
                sentiment_label = COALESCE(?, sentiment_label),
                sentiment_score = COALESCE(?, sentiment_score),
                category_id = COALESCE(?, category_id),
                cluster_id = COALESCE(?, cluster_id),
                error_message = COALESCE(?, error_message),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(self.is_spam)
        .bind(self.has_pii)
        .bind(self.moderation_notes.as_deref())
        .bind(self.is_valid)
        .bind(self.validity_reason.as_deref())
        .bind(self.classification.map(Classification::as_str))
        .bind(self.classification_confidence)
        .bind(self.summary.as_deref())
        .bind(self.keywords.as_deref())
        .bind(self.embedding.as_deref())
        .bind(self.sentiment_label.map(SentimentLabel::as_str))
        .bind(self.sentiment_score)
        .bind(self.category_id)
        .bind(self.cluster_id)
        .bind(self.error_message.as_deref())
        .bind(updated_at)
        .bind(post_id)
        .execute(pool)
        .await?;

        let affected = res.rows_affected();
        debug!(post_id, affected, "post patch applied");

        if affected == 0 {
            return Err(GroundswellError::Unexpected(format!(
                "post not found for patch: {post_id}"
            )));
        }
        Ok(())
    }
}
