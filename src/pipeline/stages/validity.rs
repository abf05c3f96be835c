//! Problem-validity screening, with optional sub-problem derivation.

use crate::db::PostPatch;
use crate::error::GroundswellError;
use crate::model::{DerivedProblem, RawPost};
use crate::pipeline::json::{bool_field, extract_object, str_field};
use crate::pipeline::stage::{Stage, StageCtx};
use crate::pipeline::state::{EnrichmentState, StageResult};
use async_trait::async_trait;
use tracing::debug;

/// Anything shorter carries no analyzable problem statement.
const MIN_CONTENT_CHARS: usize = 10;
const TOO_SHORT_REASON: &str = "Content too short to be meaningful";

const PROMPT_CONTENT_CAP: usize = 6000;

const SYSTEM_PROMPT: &str = "You judge whether a forum post describes a real problem someone is \
facing (a pain point, bug, unmet need or question), as opposed to chatter, promotion or memes. \
Respond with JSON: {\"is_valid\": bool, \"reason\": string, \
\"derived_problems\": [{\"label\": string, \"explanation\": string, \"industry\": string}]}. \
Populate derived_problems only when the post contains several distinct problems; otherwise \
return an empty array.";

pub struct ValidityCheck;

#[async_trait]
impl Stage for ValidityCheck {
    fn name(&self) -> &'static str {
        "validity_check"
    }

    async fn run(
        &self,
        ctx: &StageCtx,
        raw: &RawPost,
        state: &mut EnrichmentState,
    ) -> Result<StageResult, GroundswellError> {
        let content = raw.content();

        let result = if content.trim().len() < MIN_CONTENT_CHARS {
            state.is_valid = Some(false);
            state.validity_reason = Some(TOO_SHORT_REASON.to_string());
            StageResult::ok()
        } else {
            let excerpt: String = content.chars().take(PROMPT_CONTENT_CAP).collect();
            match ctx.llm.complete_json(SYSTEM_PROMPT, &excerpt).await {
                Ok(outcome) => {
                    match extract_object(&outcome.content) {
                        Some(verdict) => {
                            let is_valid =
                                bool_field(&verdict, &["is_valid", "isValid", "isProblem"])
                                    .unwrap_or(true);
                            state.is_valid = Some(is_valid);
                            state.validity_reason = str_field(&verdict, &["reason"])
                                .map(ToString::to_string);

                            if is_valid {
                                state.derived_problems = parse_derived(&verdict);
                            }
                        }
                        None => {
                            // Unparseable verdict: let the post through rather
                            // than silently dropping real problems.
                            debug!(post_id = %state.post_id, "validity verdict unparseable, defaulting valid");
                            state.is_valid = Some(true);
                            state.validity_reason =
                                Some("Unverified: validity verdict unparseable".to_string());
                        }
                    }
                    StageResult::ok_with_tokens(outcome.tokens_used)
                }
                Err(e) => StageResult::fail(format!("validity llm call failed: {e}")),
            }
        };

        ctx.db
            .apply_post_patch(
                &state.post_id,
                PostPatch {
                    is_valid: state.is_valid,
                    validity_reason: state.validity_reason.clone(),
                    ..PostPatch::default()
                },
            )
            .await?;

        Ok(result)
    }
}

fn parse_derived(verdict: &serde_json::Value) -> Vec<DerivedProblem> {
    let Some(items) = verdict
        .get("derived_problems")
        .or_else(|| verdict.get("derivedProblems"))
        .and_then(serde_json::Value::as_array)
    else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let label = str_field(item, &["label"])?.trim();
            if label.is_empty() {
                return None;
            }
            Some(DerivedProblem {
                label: label.to_string(),
                explanation: str_field(item, &["explanation"]).unwrap_or("").to_string(),
                industry: str_field(item, &["industry"]).map(ToString::to_string),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn derived_problems_require_labels() {
        let verdict = json!({
            "is_valid": true,
            "derived_problems": [
                {"label": "slow builds", "explanation": "CI takes an hour", "industry": "devtools"},
                {"label": "", "explanation": "dropped"},
                {"explanation": "no label at all"}
            ]
        });
        let derived = parse_derived(&verdict);
        assert_eq!(derived.len(), 1);
        assert_eq!(derived[0].label, "slow builds");
        assert_eq!(derived[0].industry.as_deref(), Some("devtools"));
    }

    #[test]
    fn missing_array_is_empty() {
        assert!(parse_derived(&json!({"is_valid": true})).is_empty());
    }
}
