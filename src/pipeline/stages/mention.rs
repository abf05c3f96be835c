//! Trend-tracking mention record, the pipeline's terminal write.

use crate::db::NewMention;
use crate::error::GroundswellError;
use crate::model::RawPost;
use crate::pipeline::stage::{Stage, StageCtx};
use crate::pipeline::state::{EnrichmentState, StageResult};
use async_trait::async_trait;
use tracing::debug;

pub struct MentionStage;

#[async_trait]
impl Stage for MentionStage {
    fn name(&self) -> &'static str {
        "record_mention"
    }

    async fn run(
        &self,
        ctx: &StageCtx,
        raw: &RawPost,
        state: &mut EnrichmentState,
    ) -> Result<StageResult, GroundswellError> {
        // A mention only makes sense when the trend dimensions all resolved.
        let upstream_ok = state.stage_succeeded("cluster_assign")
            && state.stage_succeeded("category_assign")
            && state.stage_succeeded("sentiment_analysis");
        let (Some(cluster_id), Some(category_id), Some(sentiment_score)) =
            (state.cluster_id, state.category_id, state.sentiment_score)
        else {
            return Ok(StageResult::fail(
                "mention skipped: cluster, category or sentiment missing",
            ));
        };
        if !upstream_ok {
            return Ok(StageResult::fail(
                "mention skipped: an upstream trend stage failed",
            ));
        }

        let engagement_score = engagement(raw);
        let id = ctx
            .db
            .insert_mention(NewMention {
                post_id: state.post_id.clone(),
                cluster_id,
                category_id: Some(category_id),
                sentiment_score: Some(sentiment_score),
                engagement_score,
            })
            .await?;

        state.mention_id = Some(id);
        debug!(post_id = %state.post_id, mention_id = id, "mention recorded");
        Ok(StageResult::ok())
    }
}

/// Engagement = post score plus double-weighted comment count.
fn engagement(raw: &RawPost) -> f64 {
    let comments = raw
        .metadata
        .get("num_comments")
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(0);
    raw.score as f64 + 2.0 * comments as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn engagement_weighs_comments() {
        let post = RawPost {
            id: "x".into(),
            source: "reddit".into(),
            title: String::new(),
            body: String::new(),
            author: String::new(),
            score: 10,
            url: String::new(),
            sub_source: String::new(),
            created_at: 0,
            metadata: json!({"num_comments": 4}),
        };
        assert_eq!(engagement(&post), 18.0);
    }
}
