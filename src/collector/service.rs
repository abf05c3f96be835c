//! Harvest-run orchestration.
//!
//! One run: plan strategies, execute them with bounded concurrency, drop
//! duplicates against the durable index, apply the per-sub-source watermark
//! filter, persist survivors and roll the throughput counter.

use crate::cache::CacheHandle;
use crate::collector::dedup::DedupIndex;
use crate::collector::harvester::Harvester;
use crate::collector::planner;
use crate::collector::watermark::WatermarkStore;
use crate::config::CollectorConfig;
use crate::db::DbHandle;
use crate::error::GroundswellError;
use crate::model::RawPost;
use ahash::AHashMap;
use chrono::Utc;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Rolling per-minute throughput counter key.
const FETCH_COUNTER_KEY: &str = "posts:fetched:current_minute";

pub struct CollectorService {
    cfg: CollectorConfig,
    harvester: Arc<Harvester>,
    dedup: Arc<DedupIndex>,
    watermarks: WatermarkStore,
    cache: CacheHandle,
    db: DbHandle,
}

/// Result of one harvest run.
#[derive(Debug, Default, Clone, Copy)]
pub struct HarvestSummary {
    pub strategies: usize,
    pub fetched: usize,
    pub unique: usize,
    pub persisted: usize,
}

impl CollectorService {
    pub fn new(
        cfg: CollectorConfig,
        harvester: Arc<Harvester>,
        dedup: Arc<DedupIndex>,
        watermarks: WatermarkStore,
        cache: CacheHandle,
        db: DbHandle,
    ) -> Self {
        Self {
            cfg,
            harvester,
            dedup,
            watermarks,
            cache,
            db,
        }
    }

    /// Executes one full harvest run and returns its summary.
    pub async fn run_once(&self) -> Result<HarvestSummary, GroundswellError> {
        let mut rng = rand::rng();
        let strategies = planner::plan(
            &self.cfg.sub_sources,
            self.cfg.target_per_run,
            Utc::now().timestamp(),
            &mut rng,
        );

        let mut summary = HarvestSummary {
            strategies: strategies.len(),
            ..HarvestSummary::default()
        };
        if strategies.is_empty() {
            return Ok(summary);
        }

        let harvester = self.harvester.clone();
        let batches: Vec<Vec<RawPost>> = futures::stream::iter(strategies)
            .map(|strategy| {
                let harvester = harvester.clone();
                async move { harvester.run_strategy(&strategy).await }
            })
            .buffer_unordered(self.cfg.api_concurrency.max(1))
            .collect()
            .await;

        // Group per sub-source so the watermark filter sees each stream once.
        let mut by_sub: AHashMap<String, Vec<RawPost>> = AHashMap::new();
        for batch in batches {
            summary.fetched += batch.len();
            for post in batch {
                by_sub.entry(post.sub_source.clone()).or_default().push(post);
            }
        }

        for (sub_source, posts) in by_sub {
            let persisted = self.ingest_batch(&sub_source, posts).await?;
            summary.unique += persisted.unique;
            summary.persisted += persisted.persisted;
        }

        info!(
            strategies = summary.strategies,
            fetched = summary.fetched,
            unique = summary.unique,
            persisted = summary.persisted,
            "harvest run complete"
        );
        Ok(summary)
    }

    /// Dedups, watermark-filters and persists one sub-source batch.
    pub async fn ingest_batch(
        &self,
        sub_source: &str,
        posts: Vec<RawPost>,
    ) -> Result<IngestOutcome, GroundswellError> {
        let mut outcome = IngestOutcome::default();
        if posts.is_empty() {
            return Ok(outcome);
        }

        // Dedup against everything ever seen for this source.
        let ids: Vec<String> = posts.iter().map(|p| p.id.clone()).collect();
        let seen = self.dedup.contains_many(ids.clone()).await?;
        let mut fresh: Vec<RawPost> = posts
            .into_iter()
            .zip(seen)
            .filter_map(|(post, seen)| (!seen).then_some(post))
            .collect();

        // Same id can arrive from two strategies in one run.
        fresh.sort_by(|a, b| a.id.cmp(&b.id));
        fresh.dedup_by(|a, b| a.id == b.id);

        fresh = self.watermarks.filter_new(sub_source, fresh).await?;
        outcome.unique = fresh.len();
        if fresh.is_empty() {
            return Ok(outcome);
        }

        let fresh_ids: Vec<String> = fresh.iter().map(|p| p.id.clone()).collect();
        outcome.persisted = self.db.upsert_raw_posts(fresh.clone()).await?;
        self.dedup.add_many(fresh_ids.clone()).await?;

        // Sub-source-scoped membership, for per-community analytics.
        let ttl = self.cfg.dedup_ttl_days.max(1) * 24 * 3600;
        self.cache
            .set_add_many(&format!("seen_posts:{sub_source}"), fresh_ids, Some(ttl))
            .await?;

        let fetched_this_minute = self
            .cache
            .kv_incr(FETCH_COUNTER_KEY, outcome.persisted as i64, 60)
            .await?;
        info!(
            sub_source = %sub_source,
            persisted = outcome.persisted,
            fetched_this_minute,
            "batch ingested"
        );
        Ok(outcome)
    }

    /// Continuous collection loop: one harvest run per interval, plus a
    /// streaming sweep of `new` per sub-source between runs.
    pub async fn run_forever(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let interval = Duration::from_secs(self.cfg.run_interval_secs.max(1));
        loop {
            if let Err(e) = self.run_once().await {
                warn!("harvest run failed: {e}");
            }

            for sub_source in self.cfg.sub_sources.clone() {
                let mut stream = self.harvester.clone().stream_new_continuous(
                    sub_source.clone(),
                    self.watermarks.clone(),
                    Duration::from_millis(self.cfg.time_budget_ms),
                    Duration::from_secs(self.cfg.poll_interval_secs),
                );
                while let Some(batch) = stream.next().await {
                    if let Err(e) = self.ingest_batch(&sub_source, batch).await {
                        warn!(sub_source = %sub_source, "stream batch ingest failed: {e}");
                    }
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("collector loop shutting down");
                        return;
                    }
                }
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IngestOutcome {
    pub unique: usize,
    pub persisted: usize,
}
