//! Shared test fixtures: temp-file SQLite databases and a scripted LLM.

#![allow(dead_code)]

use async_trait::async_trait;
use groundswell::cluster::ClusterRegistryHandle;
use groundswell::config::PipelineConfig;
use groundswell::db::DbHandle;
use groundswell::error::LlmError;
use groundswell::llm::{ChatOutcome, EmbedOutcome, LanguageModel};
use groundswell::metrics::Metrics;
use groundswell::model::{EMBEDDING_DIM, RawPost};
use groundswell::pipeline::{Pipeline, StageCtx};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

/// Unique on-disk SQLite database per test.
pub fn temp_database_url(tag: &str) -> (PathBuf, String) {
    let tmp_dir = std::env::temp_dir();
    let mut hasher = DefaultHasher::new();
    SystemTime::now().hash(&mut hasher);
    tag.hash(&mut hasher);
    let db_path = tmp_dir.join(format!("groundswell_test_{}_{:x}.sqlite", tag, hasher.finish()));
    let url = format!("sqlite:{}", db_path.to_str().unwrap());
    (db_path, url)
}

pub async fn cleanup_database(db_path: &PathBuf) {
    for suffix in ["-wal", "-shm", ""] {
        let path = PathBuf::from(format!("{}{}", db_path.to_string_lossy(), suffix));
        let _ = std::fs::remove_file(&path);
    }
}

/// Deterministic unit-ish embedding: the same text always lands on the same
/// axis, different texts usually land on different ones.
pub fn fake_embedding(text: &str) -> Vec<f32> {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    let axis = (hasher.finish() as usize) % EMBEDDING_DIM;
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    v[axis] = 1.0;
    v
}

/// Scripted LLM: picks the reply by recognizing which stage's system prompt
/// is asking. Unset replies default to benign happy-path verdicts.
#[derive(Clone)]
pub struct FakeLlm {
    pub spam_reply: String,
    pub validity_reply: String,
    pub classification_reply: String,
    pub semantic_reply: String,
    pub sentiment_reply: String,
    pub category_reply: String,
    /// When set, `embed` fails with this message instead of returning.
    pub embed_error: Option<String>,
}

impl Default for FakeLlm {
    fn default() -> Self {
        Self {
            spam_reply: r#"{"is_spam": false, "has_pii": false, "notes": ""}"#.to_string(),
            validity_reply:
                r#"{"is_valid": true, "reason": "Describes a concrete problem", "derived_problems": []}"#
                    .to_string(),
            classification_reply: r#"{"classification": "question", "confidence": 0.9}"#.to_string(),
            semantic_reply:
                r#"{"summary": "A user's faucet keeps dripping.", "keywords": ["faucet", "plumbing", "leak"]}"#
                    .to_string(),
            sentiment_reply: r#"{"sentiment": "negative", "score": -0.4, "confidence": 0.8}"#
                .to_string(),
            category_reply: r#"{"category": "Home & DIY", "parent": null, "description": "Household repairs"}"#
                .to_string(),
            embed_error: None,
        }
    }
}

#[async_trait]
impl LanguageModel for FakeLlm {
    async fn complete_json(&self, system: &str, _user: &str) -> Result<ChatOutcome, LlmError> {
        let content = if system.contains("content moderator") {
            self.spam_reply.clone()
        } else if system.contains("real problem") {
            self.validity_reply.clone()
        } else if system.contains("Classify") {
            self.classification_reply.clone()
        } else if system.contains("Summarize") {
            self.semantic_reply.clone()
        } else if system.contains("sentiment") {
            self.sentiment_reply.clone()
        } else {
            self.category_reply.clone()
        };
        Ok(ChatOutcome {
            content,
            tokens_used: 42,
        })
    }

    async fn embed(&self, text: &str) -> Result<EmbedOutcome, LlmError> {
        if let Some(message) = &self.embed_error {
            return Err(LlmError::Config(message.clone()));
        }
        Ok(EmbedOutcome {
            embedding: fake_embedding(text),
            tokens_used: 7,
        })
    }
}

/// Pipeline wired to a fresh registry, metrics and the given fake LLM.
pub async fn build_pipeline(db: DbHandle, llm: FakeLlm) -> (Arc<Pipeline>, Arc<Metrics>, ClusterRegistryHandle) {
    let registry = groundswell::cluster::spawn(db.clone()).await;
    let metrics = Arc::new(Metrics::new());
    let ctx = StageCtx {
        db,
        llm: Arc::new(llm),
        registry: registry.clone(),
        metrics: metrics.clone(),
        cfg: Arc::new(PipelineConfig::default()),
    };
    (Arc::new(Pipeline::new(ctx)), metrics, registry)
}

/// A realistic problem post that should survive every screening stage.
pub fn faucet_post() -> RawPost {
    RawPost {
        id: "t3_faucet1".to_string(),
        source: "reddit".to_string(),
        title: "How do I fix my leaking faucet?".to_string(),
        body: "I've tried tightening the nut but it still drips after 2 hours.".to_string(),
        author: "plumber_hopeful".to_string(),
        score: 12,
        url: "https://example.com/t3_faucet1".to_string(),
        sub_source: "homeimprovement".to_string(),
        created_at: 1_700_000_000,
        metadata: serde_json::json!({"num_comments": 3}),
    }
}

pub fn post_with(id: &str, title: &str, body: &str) -> RawPost {
    RawPost {
        id: id.to_string(),
        title: title.to_string(),
        body: body.to_string(),
        ..faucet_post()
    }
}
