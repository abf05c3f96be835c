//! The Enrichment Core: sequential per-post stage executor.
//!
//! Stages run in a fixed order on one worker; stage-level failures are
//! recorded and skipped past, store-write failures abort the post and leave
//! the retry to the job queue. Repeated execution of the same post is safe:
//! a processed record short-circuits, and the post lock admits exactly one
//! worker per epoch.

pub mod json;
pub mod stage;
pub mod stages;
pub mod state;

pub use stage::{Stage, StageCtx};
pub use state::{EnrichmentState, StageOutcome, StageResult};

use crate::db::AuditEntry;
use crate::error::GroundswellError;
use crate::model::{DerivedProblem, RawPost};
use stages::{
    CategoryStage, ClassifyStage, ClusterStage, MentionStage, SemanticStage, SentimentStage,
    SpamCheck, ValidityCheck,
};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Why a pipeline run terminated early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Spam,
    Pii,
    Invalid,
}

/// Terminal result of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// The post was already processed; nothing to do.
    AlreadyProcessed,
    /// Another worker holds the post lock.
    LockHeld,
    /// Screening stopped the post; the record is terminal `processed`.
    Stopped(StopReason),
    /// Full enrichment, plus this many derived records.
    Completed { derived: usize },
}

pub struct Pipeline {
    ctx: StageCtx,
    screening: Vec<Box<dyn Stage>>,
    downstream: Vec<Box<dyn Stage>>,
    max_retries: i64,
}

impl Pipeline {
    pub fn new(ctx: StageCtx) -> Self {
        let max_retries = ctx.cfg.job_attempts;
        Self {
            ctx,
            screening: vec![Box::new(SpamCheck), Box::new(ValidityCheck)],
            downstream: vec![
                Box::new(ClassifyStage),
                Box::new(SemanticStage),
                Box::new(SentimentStage),
                Box::new(CategoryStage),
                Box::new(ClusterStage),
                Box::new(MentionStage),
            ],
            max_retries,
        }
    }

    /// Runs the full pipeline for one post.
    pub async fn run(&self, raw: &RawPost) -> Result<PipelineOutcome, GroundswellError> {
        if let Some(existing) = self.ctx.db.get_post(&raw.id).await? {
            if existing.status() == Some(crate::model::PostStatus::Processed) {
                debug!(post_id = %raw.id, "post already processed, skipping");
                return Ok(PipelineOutcome::AlreadyProcessed);
            }
        }

        self.ctx.db.upsert_raw_post(raw.clone(), None).await?;
        if !self
            .ctx
            .db
            .acquire_post_lock(&raw.id, self.max_retries)
            .await?
        {
            debug!(post_id = %raw.id, "post lock not acquired, another worker owns it");
            return Ok(PipelineOutcome::LockHeld);
        }

        match self.execute(raw).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                let message = e.to_string();
                if let Err(mark_err) = self.ctx.db.mark_failed(&raw.id, &message).await {
                    warn!(post_id = %raw.id, "failed to record failure state: {mark_err}");
                }
                Err(GroundswellError::PipelineFailed {
                    post_id: raw.id.clone(),
                    message,
                })
            }
        }
    }

    async fn execute(&self, raw: &RawPost) -> Result<PipelineOutcome, GroundswellError> {
        let mut state = EnrichmentState::new(&raw.id);

        for stage in &self.screening {
            self.run_stage(stage.as_ref(), raw, &mut state).await?;
        }

        if state.should_stop() {
            let reason = if state.is_spam == Some(true) {
                StopReason::Spam
            } else if state.has_pii == Some(true) {
                StopReason::Pii
            } else {
                StopReason::Invalid
            };
            self.ctx.db.mark_processed(&raw.id).await?;
            info!(post_id = %raw.id, ?reason, "pipeline stopped at screening");
            return Ok(PipelineOutcome::Stopped(reason));
        }

        let derived_problems = std::mem::take(&mut state.derived_problems);
        for problem in &derived_problems {
            if let Err(e) = self.process_derived(raw, &state, problem).await {
                // A broken derivation never sinks the parent post.
                warn!(post_id = %raw.id, label = %problem.label, "derived record failed: {e}");
            }
        }

        for stage in &self.downstream {
            self.run_stage(stage.as_ref(), raw, &mut state).await?;
        }

        self.ctx.db.mark_processed(&raw.id).await?;
        info!(
            post_id = %raw.id,
            derived = derived_problems.len(),
            mention = state.mention_id.is_some(),
            "pipeline completed"
        );
        Ok(PipelineOutcome::Completed {
            derived: derived_problems.len(),
        })
    }

    /// Runs the downstream stages once for a derived sub-problem, as its own
    /// linked record sharing the parent's spam verdict.
    async fn process_derived(
        &self,
        parent: &RawPost,
        parent_state: &EnrichmentState,
        problem: &DerivedProblem,
    ) -> Result<(), GroundswellError> {
        let derived_id = format!("{}-Derived-{}", parent.id, Uuid::new_v4());

        let derived_raw = RawPost {
            id: derived_id.clone(),
            source: parent.source.clone(),
            title: problem.label.clone(),
            body: if problem.explanation.is_empty() {
                parent.body.clone()
            } else {
                problem.explanation.clone()
            },
            author: parent.author.clone(),
            score: parent.score,
            url: parent.url.clone(),
            sub_source: parent.sub_source.clone(),
            created_at: parent.created_at,
            metadata: serde_json::json!({
                "derived_from": parent.id,
                "industry": problem.industry,
            }),
        };

        self.ctx
            .db
            .upsert_raw_post(derived_raw.clone(), Some(parent.id.clone()))
            .await?;
        if !self
            .ctx
            .db
            .acquire_post_lock(&derived_id, self.max_retries)
            .await?
        {
            return Ok(());
        }

        let mut child_state = parent_state.derived_from(&derived_id);
        self.ctx
            .db
            .apply_post_patch(
                &derived_id,
                crate::db::PostPatch {
                    is_spam: child_state.is_spam,
                    has_pii: child_state.has_pii,
                    is_valid: Some(true),
                    validity_reason: Some("Derived from parent post".to_string()),
                    ..crate::db::PostPatch::default()
                },
            )
            .await?;

        match self.run_downstream_for(&derived_raw, &mut child_state).await {
            Ok(()) => {
                self.ctx.db.mark_processed(&derived_id).await?;
                debug!(post_id = %derived_id, "derived record processed");
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(mark_err) = self.ctx.db.mark_failed(&derived_id, &message).await {
                    warn!(post_id = %derived_id, "failed to record failure state: {mark_err}");
                }
                Err(e)
            }
        }
    }

    async fn run_downstream_for(
        &self,
        raw: &RawPost,
        state: &mut EnrichmentState,
    ) -> Result<(), GroundswellError> {
        for stage in &self.downstream {
            self.run_stage(stage.as_ref(), raw, state).await?;
        }
        Ok(())
    }

    /// Wraps one stage execution with the latency/token envelope, metrics and
    /// the audit trail. Only store-write failures propagate.
    async fn run_stage(
        &self,
        stage: &dyn Stage,
        raw: &RawPost,
        state: &mut EnrichmentState,
    ) -> Result<(), GroundswellError> {
        let name = stage.name();
        let start = Instant::now();
        let result = stage.run(&self.ctx, raw, state).await;
        let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(stage_result) => {
                self.ctx.metrics.record(
                    name,
                    stage_result.success,
                    latency_ms,
                    stage_result.tokens_used,
                );
                if let Err(audit_err) = self
                    .ctx
                    .db
                    .insert_audit(AuditEntry {
                        post_id: state.post_id.clone(),
                        stage: name.to_string(),
                        success: stage_result.success,
                        error: stage_result.error.clone(),
                        latency_ms: i64::try_from(latency_ms).unwrap_or(i64::MAX),
                        tokens_used: i64::try_from(stage_result.tokens_used).unwrap_or(i64::MAX),
                    })
                    .await
                {
                    warn!(stage = name, "audit insert failed: {audit_err}");
                }

                if !stage_result.success {
                    warn!(
                        post_id = %state.post_id,
                        stage = name,
                        error = stage_result.error.as_deref().unwrap_or("-"),
                        "stage failed, continuing"
                    );
                }
                state.outcomes.push(StageOutcome {
                    stage: name,
                    success: stage_result.success,
                    error: stage_result.error,
                    latency_ms,
                    tokens_used: stage_result.tokens_used,
                });
                Ok(())
            }
            Err(e) => {
                self.ctx.metrics.record(name, false, latency_ms, 0);
                Err(e)
            }
        }
    }
}
