//! Per-sub-source high-watermark over `created_at`.
//!
//! The watermark only moves forward; posts at or below it are never
//! re-emitted by the filter.

use crate::cache::CacheHandle;
use crate::error::GroundswellError;
use crate::model::RawPost;
use tracing::debug;

#[derive(Clone)]
pub struct WatermarkStore {
    cache: CacheHandle,
}

impl WatermarkStore {
    pub fn new(cache: CacheHandle) -> Self {
        Self { cache }
    }

    pub async fn last_fetched(&self, sub_source: &str) -> Result<Option<i64>, GroundswellError> {
        self.cache.kv_get_i64(&watermark_key(sub_source)).await
    }

    /// Keeps only posts newer than the watermark; when any survive, advances
    /// the watermark to the newest kept `created_at`.
    pub async fn filter_new(
        &self,
        sub_source: &str,
        posts: Vec<RawPost>,
    ) -> Result<Vec<RawPost>, GroundswellError> {
        let watermark = self.last_fetched(sub_source).await?.unwrap_or(i64::MIN);

        let fresh: Vec<RawPost> = posts
            .into_iter()
            .filter(|p| p.created_at > watermark)
            .collect();

        if let Some(newest) = fresh.iter().map(|p| p.created_at).max() {
            let advanced = self
                .cache
                .kv_max_i64(&watermark_key(sub_source), newest)
                .await?;
            debug!(sub_source, watermark = advanced, kept = fresh.len(), "watermark advanced");
        }
        Ok(fresh)
    }
}

fn watermark_key(sub_source: &str) -> String {
    format!("last_fetch:{sub_source}")
}
