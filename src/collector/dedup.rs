//! At-most-once guarantee over previously-seen post ids.
//!
//! Membership lives in the durable `seen:<source>` set (TTL refreshed to the
//! dedup horizon on every write) with an in-memory mirror inside the cache
//! actor. On boot the index is seeded from the posts table in one pass.

use crate::cache::CacheHandle;
use crate::db::DbHandle;
use crate::error::GroundswellError;
use tracing::info;

pub struct DedupIndex {
    cache: CacheHandle,
    set_key: String,
    ttl_secs: i64,
}

impl DedupIndex {
    pub fn new(cache: CacheHandle, source: &str, ttl_days: i64) -> Self {
        Self {
            cache,
            set_key: format!("seen:{source}"),
            ttl_secs: ttl_days.max(1) * 24 * 3600,
        }
    }

    /// Atomic, monotone add: returns `true` exactly once per id.
    pub async fn add(&self, id: &str) -> Result<bool, GroundswellError> {
        self.cache
            .set_add(&self.set_key, id, Some(self.ttl_secs))
            .await
    }

    /// Bulk add; returns how many ids were new.
    pub async fn add_many(&self, ids: Vec<String>) -> Result<usize, GroundswellError> {
        self.cache
            .set_add_many(&self.set_key, ids, Some(self.ttl_secs))
            .await
    }

    /// Membership bitmap in input order.
    pub async fn contains_many(&self, ids: Vec<String>) -> Result<Vec<bool>, GroundswellError> {
        self.cache.set_contains_many(&self.set_key, ids).await
    }

    /// Seeds the index from the raw-post store. Run once on boot so a wiped
    /// cache cannot cause re-ingestion of posts the store already holds.
    pub async fn warm_start(&self, db: &DbHandle, source: &str) -> Result<usize, GroundswellError> {
        let ids = db.list_post_ids(source).await?;
        let total = ids.len();
        let added = self.add_many(ids).await?;
        info!(source, total, added, "dedup index warm start complete");
        Ok(added)
    }
}
