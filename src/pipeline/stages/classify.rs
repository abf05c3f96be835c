//! Structured classification of the problem type.

use crate::db::PostPatch;
use crate::error::GroundswellError;
use crate::model::{Classification, RawPost};
use crate::pipeline::json::{extract_object, f64_field, str_field};
use crate::pipeline::stage::{Stage, StageCtx};
use crate::pipeline::state::{EnrichmentState, StageResult};
use async_trait::async_trait;
use tracing::debug;

const PROMPT_CONTENT_CAP: usize = 6000;

const SYSTEM_PROMPT: &str = "Classify the forum post into exactly one of: \
bug, feature_request, question, discussion, documentation, other. \
Respond with JSON: {\"classification\": string, \"confidence\": number between 0 and 1}.";

pub struct ClassifyStage;

#[async_trait]
impl Stage for ClassifyStage {
    fn name(&self) -> &'static str {
        "classification"
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
                let (classification, confidence) = match extract_object(&outcome.content) {
                    Some(verdict) => {
                        let label = str_field(&verdict, &["classification", "label"])
                            .map(Classification::parse_lenient)
                            .unwrap_or(Classification::Other);
                        let confidence = f64_field(&verdict, &["confidence"])
                            .unwrap_or(0.0)
                            .clamp(0.0, 1.0);
                        (label, confidence)
                    }
                    None => {
                        debug!(post_id = %state.post_id, "classification unparseable, defaulting");
                        (Classification::Other, 0.0)
                    }
                };
                state.classification = Some(classification);
                state.classification_confidence = Some(confidence);
                StageResult::ok_with_tokens(outcome.tokens_used)
            }
            Err(e) => StageResult::fail(format!("classification llm call failed: {e}")),
        };

        if state.classification.is_some() {
            ctx.db
                .apply_post_patch(
                    &state.post_id,
                    PostPatch {
                        classification: state.classification,
                        classification_confidence: state.classification_confidence,
                        ..PostPatch::default()
                    },
                )
                .await?;
        }

        Ok(result)
    }
}
