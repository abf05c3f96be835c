//! Cluster assignment over the semantic embedding.

use crate::db::PostPatch;
use crate::error::GroundswellError;
use crate::model::RawPost;
use crate::pipeline::stage::{Stage, StageCtx};
use crate::pipeline::state::{EnrichmentState, StageResult};
use async_trait::async_trait;
use tracing::debug;

pub struct ClusterStage;

#[async_trait]
impl Stage for ClusterStage {
    fn name(&self) -> &'static str {
        "cluster_assign"
    }

    async fn run(
        &self,
        ctx: &StageCtx,
        raw: &RawPost,
        state: &mut EnrichmentState,
    ) -> Result<StageResult, GroundswellError> {
        let Some(embedding) = state.embedding.clone() else {
            return Ok(StageResult::fail("no embedding available for clustering"));
        };

        let name_hint = state
            .keywords
            .first()
            .cloned()
            .unwrap_or_else(|| raw.title.clone());

        let outcome = ctx
            .registry
            .assign(
                embedding,
                ctx.cfg.cluster_similarity_threshold,
                Some(name_hint),
                state.category_id,
            )
            .await?;

        debug!(
            post_id = %state.post_id,
            cluster_id = outcome.cluster_id,
            created = outcome.created,
            similarity = outcome.similarity,
            "cluster assigned"
        );

        state.cluster_id = Some(outcome.cluster_id);
        ctx.db
            .apply_post_patch(
                &state.post_id,
                PostPatch {
                    cluster_id: state.cluster_id,
                    ..PostPatch::default()
                },
            )
            .await?;

        Ok(StageResult::ok())
    }
}
