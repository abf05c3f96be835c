//! Summary, keywords and the semantic embedding.
//!
//! Two provider calls: a chat completion for summary/keywords and the
//! embeddings endpoint for the vector. A malformed chat verdict degrades to
//! defaults; a failed embedding fails the stage since clustering depends on it.

use crate::cluster::vector::to_blob;
use crate::db::PostPatch;
use crate::error::GroundswellError;
use crate::model::RawPost;
use crate::pipeline::json::{extract_object, str_field};
use crate::pipeline::stage::{Stage, StageCtx};
use crate::pipeline::state::{EnrichmentState, StageResult};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

const PROMPT_CONTENT_CAP: usize = 6000;
const FALLBACK_SUMMARY_CHARS: usize = 280;

const SYSTEM_PROMPT: &str = "Summarize the forum post in 1-3 sentences and extract up to 8 \
keywords. Respond with JSON: {\"summary\": string, \"keywords\": [string]}.";

pub struct SemanticStage;

#[async_trait]
impl Stage for SemanticStage {
    fn name(&self) -> &'static str {
        "semantic_analysis"
    }

    async fn run(
        &self,
        ctx: &StageCtx,
        raw: &RawPost,
        state: &mut EnrichmentState,
    ) -> Result<StageResult, GroundswellError> {
        let content = raw.content();
        let excerpt: String = content.chars().take(PROMPT_CONTENT_CAP).collect();
        let mut tokens_used = 0u64;

        match ctx.llm.complete_json(SYSTEM_PROMPT, &excerpt).await {
            Ok(outcome) => {
                tokens_used += outcome.tokens_used;
                match extract_object(&outcome.content) {
                    Some(verdict) => {
                        state.summary = str_field(&verdict, &["summary"])
                            .map(ToString::to_string);
                        state.keywords = parse_keywords(&verdict);
                    }
                    None => {
                        debug!(post_id = %state.post_id, "semantic verdict unparseable, defaulting");
                    }
                }
            }
            Err(e) => {
                debug!(post_id = %state.post_id, "semantic chat call failed, defaulting: {e}");
            }
        }

        if state.summary.is_none() {
            state.summary = Some(content.chars().take(FALLBACK_SUMMARY_CHARS).collect());
        }

        // The embedding is the stage's contract; without it the cluster
        // stage has nothing to work with.
        let result = match ctx.llm.embed(&excerpt).await {
            Ok(outcome) => {
                tokens_used += outcome.tokens_used;
                state.embedding = Some(outcome.embedding);
                StageResult::ok_with_tokens(tokens_used)
            }
            Err(e) => {
                StageResult::fail_with_tokens(format!("embedding call failed: {e}"), tokens_used)
            }
        };

        ctx.db
            .apply_post_patch(
                &state.post_id,
                PostPatch {
                    summary: state.summary.clone(),
                    keywords: Some(serde_json::to_string(&state.keywords)?),
                    embedding: state.embedding.as_deref().map(to_blob),
                    ..PostPatch::default()
                },
            )
            .await?;

        Ok(result)
    }
}

/// Keywords arrive as a JSON array in the happy path; some models return a
/// comma-separated string instead.
fn parse_keywords(verdict: &Value) -> Vec<String> {
    match verdict.get("keywords") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}
