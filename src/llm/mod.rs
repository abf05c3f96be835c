//! Language-model seam for the enrichment stages.
//!
//! Stages depend on the [`LanguageModel`] capability, never on the concrete
//! client, so tests script verdicts without any network.

mod client;

pub use client::OpenAiClient;

use crate::error::LlmError;
use async_trait::async_trait;

/// Chat call result with its token cost.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub content: String,
    pub tokens_used: u64,
}

/// Embedding call result with its token cost.
#[derive(Debug, Clone)]
pub struct EmbedOutcome {
    pub embedding: Vec<f32>,
    pub tokens_used: u64,
}

/// Opaque chat + embedding provider. Both calls honor the provider's rate
/// limits internally; callers just await.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// One-shot chat completion expected to return a JSON object.
    async fn complete_json(&self, system: &str, user: &str) -> Result<ChatOutcome, LlmError>;

    /// Fixed-dimension embedding of `text`.
    async fn embed(&self, text: &str) -> Result<EmbedOutcome, LlmError>;
}

/// Crude prompt-size estimate used to debit the token bucket before a call;
/// the true usage from the response settles the metrics afterwards.
pub fn estimate_tokens(text: &str) -> u32 {
    u32::try_from(text.len() / 4 + 1).unwrap_or(u32::MAX)
}
