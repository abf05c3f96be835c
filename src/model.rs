//! Core domain types shared across the collector and the pipeline.

use groundswell_schema::forum::ForumPost;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fixed embedding dimensionality; the vector column and every centroid use it.
pub const EMBEDDING_DIM: usize = 1536;

/// An ingested but un-enriched post. Immutable once harvested.
///
/// Deserialization is lenient (missing fields default) so the HTTP surface
/// can reject incomplete posts with a 400 instead of a parse error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawPost {
    /// Globally unique within the source.
    pub id: String,
    pub source: String,
    pub title: String,
    pub body: String,
    pub author: String,
    pub score: i64,
    pub url: String,
    /// Sub-source the post came from (e.g. subreddit name).
    pub sub_source: String,
    /// Creation time, unix seconds.
    pub created_at: i64,
    /// Opaque source-specific fields carried along for audit.
    #[serde(default)]
    pub metadata: Value,
}

impl RawPost {
    /// Converts a wire-format submission into the internal ingest unit.
    pub fn from_forum(post: &ForumPost, source: &str) -> Self {
        Self {
            id: post.id.clone(),
            source: source.to_string(),
            title: post.title.clone(),
            body: post.selftext.clone(),
            author: post.author_name(),
            score: post.score,
            url: post.url.clone(),
            sub_source: post.subreddit.clone(),
            created_at: post.created_unix(),
            metadata: serde_json::json!({
                "name": post.name,
                "num_comments": post.num_comments,
                "over_18": post.over_18,
            }),
        }
    }

    /// Title and body joined for text analysis.
    pub fn content(&self) -> String {
        format!("{}\n\n{}", self.title, self.body)
    }
}

/// Lifecycle of a post through the enrichment pipeline.
///
/// `unprocessed → processing → {processed | failed}`; `processed` is terminal,
/// `failed` may re-enter `processing` while retries remain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Unprocessed,
    Processing,
    Processed,
    Failed,
}

impl PostStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PostStatus::Unprocessed => "unprocessed",
            PostStatus::Processing => "processing",
            PostStatus::Processed => "processed",
            PostStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unprocessed" => Some(PostStatus::Unprocessed),
            "processing" => Some(PostStatus::Processing),
            "processed" => Some(PostStatus::Processed),
            "failed" => Some(PostStatus::Failed),
            _ => None,
        }
    }
}

/// Structured problem classification assigned by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Bug,
    FeatureRequest,
    Question,
    Discussion,
    Documentation,
    Other,
}

impl Classification {
    pub fn as_str(self) -> &'static str {
        match self {
            Classification::Bug => "bug",
            Classification::FeatureRequest => "feature_request",
            Classification::Question => "question",
            Classification::Discussion => "discussion",
            Classification::Documentation => "documentation",
            Classification::Other => "other",
        }
    }

    /// Lenient parse of model output; anything unknown maps to `Other`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "bug" => Classification::Bug,
            "feature_request" | "feature request" => Classification::FeatureRequest,
            "question" => Classification::Question,
            "discussion" => Classification::Discussion,
            "documentation" => Classification::Documentation,
            _ => Classification::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Negative => "negative",
        }
    }

    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "positive" => SentimentLabel::Positive,
            "negative" => SentimentLabel::Negative,
            _ => SentimentLabel::Neutral,
        }
    }
}

/// A sub-problem extracted from a post by the enhanced validity check.
/// Each derivation becomes a linked virtual post downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedProblem {
    pub label: String,
    pub explanation: String,
    #[serde(default)]
    pub industry: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for status in [
            PostStatus::Unprocessed,
            PostStatus::Processing,
            PostStatus::Processed,
            PostStatus::Failed,
        ] {
            assert_eq!(PostStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PostStatus::parse("bogus"), None);
    }

    #[test]
    fn classification_lenient_parse() {
        assert_eq!(
            Classification::parse_lenient("Feature Request"),
            Classification::FeatureRequest
        );
        assert_eq!(Classification::parse_lenient("BUG"), Classification::Bug);
        assert_eq!(
            Classification::parse_lenient("something else"),
            Classification::Other
        );
    }
}
