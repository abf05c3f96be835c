//! Low-watermark queue refiller.
//!
//! Watches queue depth after completed jobs (and on a timer) and tops the
//! queue up from unprocessed posts in the store, skipping anything already
//! in flight.

use crate::db::DbHandle;
use crate::error::GroundswellError;
use crate::model::RawPost;
use crate::queue::JobQueue;
use ahash::AHashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Fallback poll cadence when no completion nudges arrive.
const POLL_INTERVAL: Duration = Duration::from_secs(15);

pub struct QueueRefiller {
    db: DbHandle,
    queue: Arc<JobQueue>,
    low_threshold: u64,
    batch_size: i64,
}

impl QueueRefiller {
    pub fn new(db: DbHandle, queue: Arc<JobQueue>, low_threshold: u64, batch_size: i64) -> Self {
        Self {
            db,
            queue,
            low_threshold,
            batch_size: batch_size.max(1),
        }
    }

    /// Checks depth and refills when `waiting + active` is at or below the
    /// threshold. Returns how many posts were enqueued.
    pub async fn refill_if_low(&self) -> Result<usize, GroundswellError> {
        let counts = self.queue.counts().await?;
        if counts.waiting + counts.active > self.low_threshold {
            return Ok(0);
        }

        let candidates = self.db.fetch_unprocessed(self.batch_size).await?;
        if candidates.is_empty() {
            return Ok(0);
        }

        let in_flight: AHashSet<String> =
            self.db.in_flight_post_ids().await?.into_iter().collect();

        let fresh: Vec<RawPost> = candidates
            .iter()
            .filter(|row| !in_flight.contains(&row.id))
            .map(|row| row.to_raw())
            .collect();

        if fresh.is_empty() {
            return Ok(0);
        }

        let enqueued = self.queue.enqueue_bulk(&fresh).await?;
        info!(
            enqueued,
            waiting = counts.waiting,
            active = counts.active,
            "queue refilled"
        );
        Ok(enqueued)
    }

    /// Refiller loop: reacts to completion nudges, polls as a fallback.
    pub async fn run(
        &self,
        mut nudges: mpsc::Receiver<()>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = nudges.recv() => {}
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("refiller shutting down");
                        return;
                    }
                }
            }

            match self.refill_if_low().await {
                Ok(0) => debug!("refill check: queue healthy or no candidates"),
                Ok(n) => debug!(enqueued = n, "refill performed"),
                Err(e) => warn!("refill failed: {e}"),
            }
        }
    }
}
