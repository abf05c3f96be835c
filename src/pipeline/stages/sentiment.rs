//! Sentiment of the post author toward their problem.

use crate::db::PostPatch;
use crate::error::GroundswellError;
use crate::model::{RawPost, SentimentLabel};
use crate::pipeline::json::{extract_object, f64_field, str_field};
use crate::pipeline::stage::{Stage, StageCtx};
use crate::pipeline::state::{EnrichmentState, StageResult};
use async_trait::async_trait;
use tracing::debug;

const PROMPT_CONTENT_CAP: usize = 6000;

const SYSTEM_PROMPT: &str = "Rate the author's sentiment. Respond with JSON: \
{\"sentiment\": \"positive\"|\"neutral\"|\"negative\", \
\"score\": number between -1 and 1, \"confidence\": number between 0 and 1}.";

pub struct SentimentStage;

#[async_trait]
impl Stage for SentimentStage {
    fn name(&self) -> &'static str {
        "sentiment_analysis"
    }

    async fn run(
        &self,
        ctx: &StageCtx,
        raw: &RawPost,
        state: &mut EnrichmentState,
    ) -> Result<StageResult, GroundswellError> {
        let excerpt: String = raw.content().chars().take(PROMPT_CONTENT_CAP).collect();

        let result = match ctx.llm.complete_json(SYSTEM_PROMPT, &excerpt).await {
            Ok(outcome) => {
                let (label, score, confidence) = match extract_object(&outcome.content) {
                    Some(verdict) => (
                        str_field(&verdict, &["sentiment", "label"])
                            .map(SentimentLabel::parse_lenient)
                            .unwrap_or(SentimentLabel::Neutral),
                        f64_field(&verdict, &["score"]).unwrap_or(0.0).clamp(-1.0, 1.0),
                        f64_field(&verdict, &["confidence"]).unwrap_or(0.5).clamp(0.0, 1.0),
                    ),
                    None => {
                        debug!(post_id = %state.post_id, "sentiment unparseable, defaulting");
                        (SentimentLabel::Neutral, 0.0, 0.5)
                    }
                };
                state.sentiment_label = Some(label);
                state.sentiment_score = Some(score);
                state.sentiment_confidence = Some(confidence);
                StageResult::ok_with_tokens(outcome.tokens_used)
            }
            Err(e) => StageResult::fail(format!("sentiment llm call failed: {e}")),
        };

        if state.sentiment_label.is_some() {
            ctx.db
                .apply_post_patch(
                    &state.post_id,
                    PostPatch {
                        sentiment_label: state.sentiment_label,
                        sentiment_score: state.sentiment_score,
                        ..PostPatch::default()
                    },
                )
                .await?;
        }

        Ok(result)
    }
}
