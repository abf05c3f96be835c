//! Spam and PII screening: deterministic rules OR'd with an LLM verdict.
//!
//! The rule verdict is written to state before the LLM is consulted, so a
//! misbehaving model can never un-flag something the rules caught.

use crate::db::PostPatch;
use crate::error::GroundswellError;
use crate::model::RawPost;
use crate::pipeline::json::{bool_field, extract_object, str_field};
use crate::pipeline::stage::{Stage, StageCtx};
use crate::pipeline::state::{EnrichmentState, StageResult};
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

const PROMPT_CONTENT_CAP: usize = 4000;

const SYSTEM_PROMPT: &str = "You are a strict content moderator for a product-feedback platform. \
Given a forum post, respond with a JSON object: \
{\"is_spam\": bool, \"has_pii\": bool, \"notes\": string}. \
Spam includes advertising, giveaways, engagement bait and link farms. \
PII includes personal emails, phone numbers, government IDs and payment card numbers.";

static PII_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        (
            "ssn",
            Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("static regex"),
        ),
        (
            "email",
            Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")
                .expect("static regex"),
        ),
        (
            "phone",
            Regex::new(r"\b\(?\d{3}\)?[-.\s]\d{3}[-.\s]?\d{4}\b").expect("static regex"),
        ),
        (
            "credit_card",
            Regex::new(r"\b\d{4}[ -]?\d{4}[ -]?\d{4}[ -]?\d{4}\b").expect("static regex"),
        ),
    ]
});

static SPAM_INDICATORS: &[&str] = &[
    "buy now",
    "click here",
    "free money",
    "limited time",
    "act now",
    "100% free",
    "make money fast",
    "work from home",
    "earn from home",
    "crypto giveaway",
    "dm me for",
    "subscribe to my",
    "promo code",
];

/// Deterministic rule verdict.
pub(crate) fn rule_verdict(text: &str) -> (bool, bool, Vec<String>) {
    let lowered = text.to_lowercase();
    let mut notes = Vec::new();

    let spam = SPAM_INDICATORS.iter().any(|marker| {
        let hit = lowered.contains(marker);
        if hit {
            notes.push(format!("spam indicator: {marker}"));
        }
        hit
    });

    let mut pii = false;
    for (label, pattern) in PII_PATTERNS.iter() {
        if pattern.is_match(text) {
            pii = true;
            notes.push(format!("pii pattern: {label}"));
        }
    }

    (spam, pii, notes)
}

pub struct SpamCheck;

#[async_trait]
impl Stage for SpamCheck {
    fn name(&self) -> &'static str {
        "spam_check"
    }

    async fn run(
        &self,
        ctx: &StageCtx,
        raw: &RawPost,
        state: &mut EnrichmentState,
    ) -> Result<StageResult, GroundswellError> {
        let content = raw.content();
        let (rule_spam, rule_pii, mut notes) = rule_verdict(&content);

        // Rules are authoritative on their own; the LLM can only widen the net.
        state.is_spam = Some(rule_spam);
        state.has_pii = Some(rule_pii);

        let excerpt: String = content.chars().take(PROMPT_CONTENT_CAP).collect();
        let result = match ctx.llm.complete_json(SYSTEM_PROMPT, &excerpt).await {
            Ok(outcome) => {
                match extract_object(&outcome.content) {
                    Some(verdict) => {
                        let llm_spam = bool_field(&verdict, &["is_spam", "isSpam"]).unwrap_or(false);
                        let llm_pii = bool_field(&verdict, &["has_pii", "hasPii"]).unwrap_or(false);
                        if let Some(note) = str_field(&verdict, &["notes"]) {
                            if !note.is_empty() {
                                notes.push(note.to_string());
                            }
                        }
                        state.is_spam = Some(rule_spam || llm_spam);
                        state.has_pii = Some(rule_pii || llm_pii);
                    }
                    None => {
                        // Unparseable verdict: the rule result stands and the
                        // stage still counts as successful.
                        debug!(post_id = %state.post_id, "spam verdict unparseable, using rules only");
                        notes.push("llm verdict unparseable".to_string());
                    }
                }
                StageResult::ok_with_tokens(outcome.tokens_used)
            }
            // Transport failure after retries: the rule verdict is already in
            // state; record the stage as failed.
            Err(e) => StageResult::fail(format!("spam llm call failed: {e}")),
        };

        if !notes.is_empty() {
            state.moderation_notes = Some(notes.join("; "));
        }

        ctx.db
            .apply_post_patch(
                &state.post_id,
                PostPatch {
                    is_spam: state.is_spam,
                    has_pii: state.has_pii,
                    moderation_notes: state.moderation_notes.clone(),
                    ..PostPatch::default()
                },
            )
            .await?;

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_passes_rules() {
        let (spam, pii, notes) = rule_verdict("My faucet drips after I tightened the nut.");
        assert!(!spam);
        assert!(!pii);
        assert!(notes.is_empty());
    }

    #[test]
    fn spam_indicators_match_case_insensitively() {
        let (spam, _, _) = rule_verdict("Buy Now! Click HERE to win free money");
        assert!(spam);
    }

    #[test]
    fn ssn_pattern_flags_pii() {
        let (_, pii, notes) = rule_verdict("my SSN 123-45-6789 got leaked");
        assert!(pii);
        assert!(notes.iter().any(|n| n.contains("ssn")));
    }

    #[test]
    fn email_and_card_flag_pii() {
        let (_, pii, _) = rule_verdict("reach me at someone@example.com");
        assert!(pii);
        let (_, card, _) = rule_verdict("charged to 4242 4242 4242 4242 twice");
        assert!(card);
    }
}
