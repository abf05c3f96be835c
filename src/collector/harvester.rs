//! Strategy execution against the forum API.
//!
//! Every call flows through the credential pool and the API rate gate. A
//! rate-limited credential is cooled and the call retried on the next one;
//! any other error is recorded and the strategy yields an empty result so
//! one bad call never sinks a run.

use crate::collector::credentials::CredentialPool;
use crate::collector::planner::SamplingStrategy;
use crate::collector::rate_gate::RateGate;
use crate::collector::watermark::WatermarkStore;
use crate::error::{ForumError, GroundswellError};
use crate::forum::{ForumClient, ListingQuery};
use crate::model::RawPost;
use groundswell_schema::forum::SortMethod;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

/// Page size used by the continuous stream.
const STREAM_PAGE_LIMIT: u32 = 100;
/// Batches buffered ahead of the consumer before the producer parks.
const STREAM_CHANNEL_DEPTH: usize = 4;

pub struct Harvester {
    client: Arc<ForumClient>,
    pool: Arc<CredentialPool>,
    api_gate: Arc<RateGate>,
    /// Sweep cadence gate for the continuous stream (one poll per period).
    poll_gate: Arc<RateGate>,
    api_permits: Arc<Semaphore>,
    source: String,
    cooldown: Duration,
}

impl Harvester {
    pub fn new(
        client: Arc<ForumClient>,
        pool: Arc<CredentialPool>,
        api_gate: Arc<RateGate>,
        poll_gate: Arc<RateGate>,
        api_concurrency: usize,
        source: &str,
        cooldown: Duration,
    ) -> Self {
        Self {
            client,
            pool,
            api_gate,
            poll_gate,
            api_permits: Arc::new(Semaphore::new(api_concurrency.max(1))),
            source: source.to_string(),
            cooldown,
        }
    }

    /// Executes one sampling strategy, returning whatever it yielded.
    /// Rate limits rotate credentials (up to pool size − 1 swaps); other
    /// errors end the strategy with an empty result.
    pub async fn run_strategy(&self, strategy: &SamplingStrategy) -> Vec<RawPost> {
        let swaps = self.pool.len().saturating_sub(1);

        for attempt in 0..=swaps {
            match self.try_strategy_once(strategy).await {
                Ok(posts) => return posts,
                Err(GroundswellError::Forum(e)) if e.is_rate_limit() => {
                    debug!(
                        sub_source = %strategy.sub_source,
                        attempt,
                        "strategy rate limited, rotating credential"
                    );
                    continue;
                }
                Err(e) => {
                    warn!(
                        sub_source = %strategy.sub_source,
                        sort = %strategy.sort,
                        "strategy failed: {e}"
                    );
                    return Vec::new();
                }
            }
        }

        warn!(
            sub_source = %strategy.sub_source,
            "strategy exhausted all credentials on rate limits"
        );
        Vec::new()
    }

    async fn try_strategy_once(
        &self,
        strategy: &SamplingStrategy,
    ) -> Result<Vec<RawPost>, GroundswellError> {
        let lease = self.pool.next().await?;

        let _permit = self
            .api_permits
            .acquire()
            .await
            .map_err(|e| GroundswellError::Unexpected(format!("api semaphore closed: {e}")))?;
        self.api_gate.acquire().await;

        let mut query = ListingQuery {
            limit: strategy.limit,
            time_filter: strategy.time_filter,
            after: None,
            count: strategy.offset,
        };

        // A deep offset needs cursor pagination to skip ahead before
        // collecting; the skip pages are cheap (ids only matter).
        if let Some(offset) = strategy.offset {
            match self.skip_to_offset(&lease, strategy, offset).await {
                Ok(Some(after)) => query.after = Some(after),
                Ok(None) => return Ok(Vec::new()),
                Err(e) => return Err(self.map_listing_error(lease.index, e).await),
            }
        }

        let listing = match self
            .client
            .listing(
                lease.index,
                &lease.account,
                &strategy.sub_source,
                strategy.sort,
                &query,
            )
            .await
        {
            Ok(listing) => listing,
            Err(e) => return Err(self.map_listing_error(lease.index, e).await),
        };

        let mut posts: Vec<RawPost> = listing
            .children
            .iter()
            .map(|child| RawPost::from_forum(&child.data, &self.source))
            .collect();

        // Windowed scans bound by creation time.
        if strategy.after_unix.is_some() || strategy.before_unix.is_some() {
            let lo = strategy.after_unix.unwrap_or(i64::MIN);
            let hi = strategy.before_unix.unwrap_or(i64::MAX);
            posts.retain(|p| p.created_at > lo && p.created_at <= hi);
        }

        debug!(
            sub_source = %strategy.sub_source,
            sort = %strategy.sort,
            yielded = posts.len(),
            credential = lease.index,
            "strategy executed"
        );
        Ok(posts)
    }

    /// Pages past `offset` items, returning the cursor to continue from.
    async fn skip_to_offset(
        &self,
        lease: &crate::collector::credentials::CredentialLease,
        strategy: &SamplingStrategy,
        offset: u32,
    ) -> Result<Option<String>, ForumError> {
        let mut skipped = 0u32;
        let mut after: Option<String> = None;

        while skipped < offset {
            let page = offset.saturating_sub(skipped).min(STREAM_PAGE_LIMIT);
            self.api_gate.acquire().await;
            let listing = self
                .client
                .listing(
                    lease.index,
                    &lease.account,
                    &strategy.sub_source,
                    strategy.sort,
                    &ListingQuery {
                        limit: page,
                        time_filter: strategy.time_filter,
                        after: after.clone(),
                        count: Some(skipped),
                    },
                )
                .await?;

            skipped += listing.children.len() as u32;
            after = listing.after.clone();
            if after.is_none() || listing.children.is_empty() {
                return Ok(None);
            }
        }
        Ok(after)
    }

    async fn map_listing_error(&self, index: usize, e: ForumError) -> GroundswellError {
        if e.is_rate_limit() {
            if let Err(cool_err) = self.pool.cooldown(index, self.cooldown).await {
                warn!("failed to persist cooldown for credential {index}: {cool_err}");
            }
        }
        GroundswellError::Forum(e)
    }

    /// Continuous streaming of fresh posts from one sub-source.
    ///
    /// Within `time_budget`, repeatedly paginates `new` with the `after`
    /// cursor; a page whose tail is at or below the watermark ends the inner
    /// loop early. Sleeps `poll_interval` between sweeps. Batches are lazily
    /// produced over a bounded channel so the consumer controls pacing; each
    /// batch is self-contained and survives a mid-run cancellation.
    pub fn stream_new_continuous(
        self: Arc<Self>,
        sub_source: String,
        watermarks: WatermarkStore,
        time_budget: Duration,
        poll_interval: Duration,
    ) -> ReceiverStream<Vec<RawPost>> {
        let (tx, rx) = mpsc::channel::<Vec<RawPost>>(STREAM_CHANNEL_DEPTH);

        tokio::spawn(async move {
            let deadline = Instant::now() + time_budget;

            'outer: while Instant::now() < deadline {
                self.poll_gate.acquire().await;
                let watermark = match watermarks.last_fetched(&sub_source).await {
                    Ok(w) => w.unwrap_or(i64::MIN),
                    Err(e) => {
                        warn!(sub_source = %sub_source, "watermark read failed, stopping stream: {e}");
                        break;
                    }
                };

                let mut after: Option<String> = None;
                loop {
                    if Instant::now() >= deadline {
                        break 'outer;
                    }

                    let lease = match self.pool.next().await {
                        Ok(lease) => lease,
                        Err(e) => {
                            warn!(sub_source = %sub_source, "no credential for stream sweep: {e}");
                            break;
                        }
                    };
                    self.api_gate.acquire().await;

                    let listing = match self
                        .client
                        .listing(
                            lease.index,
                            &lease.account,
                            &sub_source,
                            SortMethod::New,
                            &ListingQuery {
                                limit: STREAM_PAGE_LIMIT,
                                after: after.clone(),
                                ..ListingQuery::default()
                            },
                        )
                        .await
                    {
                        Ok(listing) => listing,
                        Err(e) => {
                            let _ = self.map_listing_error(lease.index, e).await;
                            break;
                        }
                    };

                    let posts: Vec<RawPost> = listing
                        .children
                        .iter()
                        .map(|child| RawPost::from_forum(&child.data, &self.source))
                        .collect();

                    let tail_created = posts.iter().map(|p| p.created_at).min();
                    let next_after = listing.after.clone();
                    let page_len = posts.len();

                    if !posts.is_empty() && tx.send(posts).await.is_err() {
                        // Consumer dropped the stream; stop producing.
                        break 'outer;
                    }

                    // Pagination halts once we reach already-harvested history.
                    if tail_created.is_some_and(|t| t <= watermark) {
                        debug!(sub_source = %sub_source, watermark, "stream reached watermark");
                        break;
                    }
                    match next_after {
                        Some(cursor) if page_len > 0 => after = Some(cursor),
                        _ => break,
                    }
                }

                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining <= poll_interval {
                    break;
                }
                tokio::time::sleep(poll_interval).await;
            }

            info!(sub_source = %sub_source, "continuous stream finished");
        });

        ReceiverStream::new(rx)
    }
}
