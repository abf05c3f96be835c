//! Mutable per-post state threaded through the stage sequence.

use crate::model::{Classification, DerivedProblem, SentimentLabel};

/// Result envelope one stage hands back to the pipeline. Latency is measured
/// by the pipeline wrapper, not the stage.
#[derive(Debug, Clone)]
pub struct StageResult {
    pub success: bool,
    pub error: Option<String>,
    pub tokens_used: u64,
}

impl StageResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            tokens_used: 0,
        }
    }

    pub fn ok_with_tokens(tokens_used: u64) -> Self {
        Self {
            success: true,
            error: None,
            tokens_used,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            tokens_used: 0,
        }
    }

    pub fn fail_with_tokens(error: impl Into<String>, tokens_used: u64) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            tokens_used,
        }
    }
}

/// Recorded execution of one stage, with the latency/token envelope.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub stage: &'static str,
    pub success: bool,
    pub error: Option<String>,
    pub latency_ms: u64,
    pub tokens_used: u64,
}

/// Everything the stages have learned about one post so far. Later stages
/// observe earlier results; no stage ever observes a later one.
#[derive(Debug, Default)]
pub struct EnrichmentState {
    pub post_id: String,

    // SpamCheck
    pub is_spam: Option<bool>,
    pub has_pii: Option<bool>,
    pub moderation_notes: Option<String>,

    // ValidityCheck
    pub is_valid: Option<bool>,
    pub validity_reason: Option<String>,
    pub derived_problems: Vec<DerivedProblem>,

    // Classification
    pub classification: Option<Classification>,
    pub classification_confidence: Option<f64>,

    // SemanticAnalysis
    pub summary: Option<String>,
    pub keywords: Vec<String>,
    pub embedding: Option<Vec<f32>>,

    // SentimentAnalysis
    pub sentiment_label: Option<SentimentLabel>,
    pub sentiment_score: Option<f64>,
    pub sentiment_confidence: Option<f64>,

    // CategoryAssign / ClusterAssign / RecordMention
    pub category_id: Option<i64>,
    pub cluster_id: Option<i64>,
    pub mention_id: Option<i64>,

    pub outcomes: Vec<StageOutcome>,
}

impl EnrichmentState {
    pub fn new(post_id: impl Into<String>) -> Self {
        Self {
            post_id: post_id.into(),
            ..Self::default()
        }
    }

    /// Fresh state for a derived record, inheriting the parent's spam verdict.
    pub fn derived_from(&self, post_id: impl Into<String>) -> Self {
        Self {
            post_id: post_id.into(),
            is_spam: self.is_spam,
            has_pii: self.has_pii,
            moderation_notes: self.moderation_notes.clone(),
            is_valid: Some(true),
            ..Self::default()
        }
    }

    pub fn stage_succeeded(&self, stage: &str) -> bool {
        self.outcomes
            .iter()
            .any(|o| o.stage == stage && o.success)
    }

    /// Early-termination predicate: a confirmed spam/PII verdict or an
    /// explicit invalid verdict stops the pipeline. An unset `is_valid`
    /// (e.g. the validity stage itself failed) does not stop.
    pub fn should_stop(&self) -> bool {
        self.is_spam == Some(true)
            || self.has_pii == Some(true)
            || self.is_valid == Some(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_predicate() {
        let mut state = EnrichmentState::new("p1");
        assert!(!state.should_stop());

        state.is_spam = Some(false);
        state.is_valid = None; // validity stage failed
        assert!(!state.should_stop());

        state.is_valid = Some(true);
        assert!(!state.should_stop());

        state.has_pii = Some(true);
        assert!(state.should_stop());

        let mut invalid = EnrichmentState::new("p2");
        invalid.is_valid = Some(false);
        assert!(invalid.should_stop());
    }

    #[test]
    fn derived_state_inherits_spam_verdict() {
        let mut parent = EnrichmentState::new("p1");
        parent.is_spam = Some(false);
        parent.has_pii = Some(false);
        parent.moderation_notes = Some("clean".to_string());

        let child = parent.derived_from("p1-Derived-x");
        assert_eq!(child.is_spam, Some(false));
        assert_eq!(child.is_valid, Some(true));
        assert!(child.outcomes.is_empty());
    }
}
