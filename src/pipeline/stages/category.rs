//! Industry/category assignment via find-or-create.

use crate::db::PostPatch;
use crate::error::GroundswellError;
use crate::model::RawPost;
use crate::pipeline::json::{extract_object, str_field};
use crate::pipeline::stage::{Stage, StageCtx};
use crate::pipeline::state::{EnrichmentState, StageResult};
use async_trait::async_trait;
use tracing::debug;

const PROMPT_CONTENT_CAP: usize = 4000;
const FALLBACK_CATEGORY: &str = "General";

/// Seed industries offered to the model alongside whatever categories
/// already exist.
const INDUSTRY_CANDIDATES: &[&str] = &[
    "Software & SaaS",
    "Consumer Hardware",
    "Home & DIY",
    "Finance & Banking",
    "Health & Fitness",
    "Education",
    "E-commerce & Retail",
    "Gaming",
    "Transportation",
    "Food & Hospitality",
    "General",
];

pub struct CategoryStage;

#[async_trait]
impl Stage for CategoryStage {
    fn name(&self) -> &'static str {
        "category_assign"
    }

    async fn run(
        &self,
        ctx: &StageCtx,
        raw: &RawPost,
        state: &mut EnrichmentState,
    ) -> Result<StageResult, GroundswellError> {
        let existing = ctx.db.list_category_names().await?;
        let mut candidates: Vec<&str> = INDUSTRY_CANDIDATES.to_vec();
        for name in &existing {
            if !candidates.iter().any(|c| c.eq_ignore_ascii_case(name)) {
                candidates.push(name.as_str());
            }
        }

        let system = format!(
            "Pick the single best category for the post from this list (or coin a close \
variant only when nothing fits): {}. Respond with JSON: \
{{\"category\": string, \"parent\": string|null, \"description\": string}}.",
            candidates.join(", ")
        );
        let excerpt: String = raw.content().chars().take(PROMPT_CONTENT_CAP).collect();

        let result = match ctx.llm.complete_json(&system, &excerpt).await {
            Ok(outcome) => {
                let (name, parent, description) = match extract_object(&outcome.content) {
                    Some(verdict) => (
                        str_field(&verdict, &["category", "industry"])
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .unwrap_or(FALLBACK_CATEGORY)
                            .to_string(),
                        str_field(&verdict, &["parent"])
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(ToString::to_string),
                        str_field(&verdict, &["description"])
                            .unwrap_or("")
                            .to_string(),
                    ),
                    None => {
                        debug!(post_id = %state.post_id, "category verdict unparseable, defaulting");
                        (FALLBACK_CATEGORY.to_string(), None, String::new())
                    }
                };

                let parent_id = match parent {
                    Some(parent_name) if !parent_name.eq_ignore_ascii_case(&name) => {
                        Some(ctx.db.find_or_create_category(&parent_name, "", None).await?)
                    }
                    _ => None,
                };
                let category_id = ctx
                    .db
                    .find_or_create_category(&name, &description, parent_id)
                    .await?;

                state.category_id = Some(category_id);
                StageResult::ok_with_tokens(outcome.tokens_used)
            }
            Err(e) => StageResult::fail(format!("category llm call failed: {e}")),
        };

        if state.category_id.is_some() {
            ctx.db
                .apply_post_patch(
                    &state.post_id,
                    PostPatch {
                        category_id: state.category_id,
                        ..PostPatch::default()
                    },
                )
                .await?;
        }

        Ok(result)
    }
}
