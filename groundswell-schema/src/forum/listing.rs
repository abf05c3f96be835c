//! Listing envelope and post payload returned by the forum listing endpoints.
//!
//! The API wraps everything in `{"kind": ..., "data": ...}` envelopes:
//! a listing is `kind: "Listing"` whose data holds a page of `kind: "t3"`
//! children plus an `after` cursor for pagination.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Outer envelope: `{"kind": "Listing", "data": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingEnvelope {
    #[serde(default)]
    pub kind: String,
    pub data: ForumListing,
}

/// One page of listing results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForumListing {
    /// Fullname cursor of the last item, for `after=` pagination.
    /// `None` when the listing is exhausted.
    #[serde(default)]
    pub after: Option<String>,

    /// Number of items in this page, when the API reports it.
    #[serde(default)]
    pub dist: Option<u32>,

    #[serde(default)]
    pub children: Vec<ThingEnvelope>,
}

/// Per-item envelope: `{"kind": "t3", "data": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThingEnvelope {
    #[serde(default)]
    pub kind: String,
    pub data: ForumPost,
}

/// A single submission as returned by the listing API.
///
/// Unknown fields are collected into `extra` so deserialization survives
/// API additions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForumPost {
    /// Short id unique within the source (e.g. `abc123`).
    #[serde(default)]
    pub id: String,

    /// Fullname (`t3_abc123`), used as the pagination cursor.
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub title: String,

    /// Self-text body; empty for link posts.
    #[serde(default)]
    pub selftext: String,

    /// Author may arrive as a flat string or as `{"name": ...}` from
    /// older API surfaces; callers normalize via [`ForumPost::author_name`].
    #[serde(default)]
    pub author: Value,

    #[serde(default)]
    pub score: i64,

    #[serde(default)]
    pub url: String,

    /// Sub-source this post belongs to (e.g. subreddit name).
    #[serde(default)]
    pub subreddit: String,

    /// Creation time, unix seconds. The API serves this as a float.
    #[serde(default)]
    pub created_utc: f64,

    #[serde(default)]
    pub num_comments: i64,

    #[serde(default)]
    pub over_18: bool,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ForumPost {
    /// Flat author name regardless of the wire representation.
    pub fn author_name(&self) -> String {
        match &self.author {
            Value::String(s) => s.clone(),
            Value::Object(map) => map
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("[unknown]")
                .to_string(),
            _ => "[unknown]".to_string(),
        }
    }

    /// Creation time truncated to whole unix seconds.
    pub fn created_unix(&self) -> i64 {
        self.created_utc as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn listing_page_roundtrip() {
        let raw = json!({
            "kind": "Listing",
            "data": {
                "after": "t3_def456",
                "dist": 2,
                "children": [
                    {"kind": "t3", "data": {
                        "id": "abc123",
                        "name": "t3_abc123",
                        "title": "My sink leaks",
                        "selftext": "water everywhere",
                        "author": "plumberfan",
                        "score": 42,
                        "subreddit": "homeimprovement",
                        "created_utc": 1700000000.0
                    }},
                    {"kind": "t3", "data": {
                        "id": "def456",
                        "name": "t3_def456",
                        "title": "link post",
                        "author": {"name": "nested_author"},
                        "created_utc": 1700000100.5
                    }}
                ]
            }
        });

        let env: ListingEnvelope = serde_json::from_value(raw).unwrap();
        assert_eq!(env.data.after.as_deref(), Some("t3_def456"));
        assert_eq!(env.data.children.len(), 2);

        let first = &env.data.children[0].data;
        assert_eq!(first.author_name(), "plumberfan");
        assert_eq!(first.created_unix(), 1_700_000_000);

        let second = &env.data.children[1].data;
        assert_eq!(second.author_name(), "nested_author");
        assert_eq!(second.created_unix(), 1_700_000_100);
    }

    #[test]
    fn unknown_fields_are_preserved() {
        let raw = json!({
            "id": "x",
            "created_utc": 1.0,
            "upvote_ratio": 0.97
        });
        let post: ForumPost = serde_json::from_value(raw).unwrap();
        assert_eq!(post.extra.get("upvote_ratio"), Some(&json!(0.97)));
    }
}
