//! Durable at-least-once enrichment queue and its worker loops.
//!
//! The queue owns retries: a job that errors is rescheduled with exponential
//! backoff until its attempts are exhausted, at which point the enriched
//! record has already been marked `failed` by the pipeline.

pub mod refiller;

pub use refiller::QueueRefiller;

use crate::db::{DbHandle, QueueCounts};
use crate::error::GroundswellError;
use crate::model::RawPost;
use crate::pipeline::Pipeline;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Idle poll cadence when the queue is empty.
const IDLE_POLL: Duration = Duration::from_millis(500);

pub struct JobQueue {
    db: DbHandle,
    attempts: i64,
    backoff_ms: u64,
}

impl JobQueue {
    pub fn new(db: DbHandle, attempts: i64, backoff_ms: u64) -> Self {
        Self {
            db,
            attempts: attempts.max(1),
            backoff_ms,
        }
    }

    pub async fn enqueue(&self, post: &RawPost) -> Result<i64, GroundswellError> {
        let payload = serde_json::to_string(post)?;
        self.db
            .enqueue_job(
                &post.id,
                &payload,
                self.attempts,
                Utc::now().timestamp_millis(),
            )
            .await
    }

    pub async fn enqueue_bulk(&self, posts: &[RawPost]) -> Result<usize, GroundswellError> {
        let mut enqueued = 0usize;
        for post in posts {
            self.enqueue(post).await?;
            enqueued += 1;
        }
        Ok(enqueued)
    }

    pub async fn counts(&self) -> Result<QueueCounts, GroundswellError> {
        self.db.job_counts().await
    }

    /// One claim-and-run cycle. Returns whether a job was claimed.
    async fn work_one(&self, pipeline: &Pipeline) -> Result<bool, GroundswellError> {
        let now_ms = Utc::now().timestamp_millis();
        let Some(job) = self.db.claim_next_job(now_ms).await? else {
            return Ok(false);
        };

        let raw = match job.raw_post() {
            Ok(raw) => raw,
            Err(e) => {
                warn!(job_id = job.id, "job payload undecodable: {e}");
                let now_ms = Utc::now().timestamp_millis();
                let msg = format!("payload decode failed: {e}");
                self.db.fail_job(job, &msg, self.backoff_ms, now_ms).await?;
                return Ok(true);
            }
        };

        match pipeline.run(&raw).await {
            Ok(outcome) => {
                debug!(job_id = job.id, post_id = %raw.id, ?outcome, "job completed");
                self.db.complete_job(job.id).await?;
            }
            Err(e) => {
                let message = e.to_string();
                let now_ms = Utc::now().timestamp_millis();
                let will_retry = self
                    .db
                    .fail_job(job, &message, self.backoff_ms, now_ms)
                    .await?;
                warn!(post_id = %raw.id, will_retry, "job failed: {message}");
            }
        }
        Ok(true)
    }
}

/// Spawns `concurrency` worker loops consuming the queue. Each completed job
/// nudges the refiller via `refill_tx`.
pub fn spawn_workers(
    queue: Arc<JobQueue>,
    pipeline: Arc<Pipeline>,
    concurrency: usize,
    refill_tx: mpsc::Sender<()>,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let concurrency = concurrency.max(1);
    info!(concurrency, "starting queue workers");

    (0..concurrency)
        .map(|worker| {
            let queue = queue.clone();
            let pipeline = pipeline.clone();
            let refill_tx = refill_tx.clone();
            let mut shutdown = shutdown.clone();

            tokio::spawn(async move {
                loop {
                    if *shutdown.borrow() {
                        break;
                    }

                    match queue.work_one(&pipeline).await {
                        Ok(true) => {
                            // Wake the refiller; a full queue just drained by one.
                            let _ = refill_tx.try_send(());
                        }
                        Ok(false) => {
                            tokio::select! {
                                _ = tokio::time::sleep(IDLE_POLL) => {}
                                changed = shutdown.changed() => {
                                    // A dropped sender means the process is going away.
                                    if changed.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                        Err(e) => {
                            warn!(worker, "worker cycle failed: {e}");
                            tokio::time::sleep(IDLE_POLL).await;
                        }
                    }
                }
                info!(worker, "queue worker stopped");
            })
        })
        .collect()
}
