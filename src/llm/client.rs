use super::{ChatOutcome, EmbedOutcome, LanguageModel, estimate_tokens};
use crate::collector::rate_gate::RateGate;
use crate::config::PipelineConfig;
use crate::error::{IsRetryable, LlmError};
use crate::model::EMBEDDING_DIM;
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use groundswell_schema::openai::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, EmbeddingRequest,
    EmbeddingResponse, ResponseFormat,
};
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

/// Output ceiling for verdict-style completions.
const MAX_COMPLETION_TOKENS: u32 = 1024;

/// OpenAI-compatible chat + embeddings client, gated by the request-per-minute
/// and token-per-minute buckets and retried with exponential backoff.
pub struct OpenAiClient {
    http: reqwest::Client,
    chat_url: Url,
    embeddings_url: Url,
    api_key: String,
    chat_model: String,
    embedding_model: String,
    request_gate: RateGate,
    token_gate: RateGate,
    retry_policy: ExponentialBuilder,
}

impl OpenAiClient {
    pub fn new(cfg: &PipelineConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()?;

        let base = Url::parse(&cfg.llm_api_base)
            .map_err(|e| LlmError::Config(format!("invalid llm_api_base: {e}")))?;

        let retry_policy = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(cfg.retry_delay_ms))
            .with_max_times(cfg.retry_attempts)
            .with_jitter();

        Ok(Self {
            http,
            chat_url: base
                .join("v1/chat/completions")
                .expect("static path segment"),
            embeddings_url: base.join("v1/embeddings").expect("static path segment"),
            api_key: cfg.llm_api_key.clone(),
            chat_model: cfg.chat_model.clone(),
            embedding_model: cfg.embedding_model.clone(),
            request_gate: RateGate::per_minute(
                "llm_requests",
                cfg.max_requests_per_minute,
                cfg.max_requests_per_minute,
            ),
            token_gate: RateGate::per_minute(
                "llm_tokens",
                cfg.max_tokens_per_minute,
                cfg.max_tokens_per_minute,
            ),
            retry_policy,
        })
    }

    async fn post_chat(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, LlmError> {
        let resp = self
            .http
            .post(self.chat_url.clone())
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LlmError::UpstreamStatus(status));
        }
        Ok(resp.json().await?)
    }

    async fn post_embeddings(
        &self,
        request: &EmbeddingRequest,
    ) -> Result<EmbeddingResponse, LlmError> {
        let resp = self
            .http
            .post(self.embeddings_url.clone())
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LlmError::UpstreamStatus(status));
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn complete_json(&self, system: &str, user: &str) -> Result<ChatOutcome, LlmError> {
        let estimated = estimate_tokens(system)
            .saturating_add(estimate_tokens(user))
            .saturating_add(MAX_COMPLETION_TOKENS);

        self.request_gate.acquire().await;
        self.token_gate.acquire_n(estimated).await;

        let request = ChatCompletionRequest {
            model: self.chat_model.clone(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            temperature: Some(0.0),
            max_tokens: Some(MAX_COMPLETION_TOKENS),
            response_format: Some(ResponseFormat::json_object()),
        };

        let response = (|| async { self.post_chat(&request).await })
            .retry(self.retry_policy)
            .when(|e: &LlmError| e.is_retryable())
            .notify(|err, dur: Duration| {
                error!("LLM chat retrying error {} with sleeping {:?}", err, dur);
            })
            .await?;

        let content = response
            .first_content()
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)?
            .to_string();

        debug!(
            model = %response.model,
            tokens = response.usage.total_tokens,
            "chat completion ok"
        );
        Ok(ChatOutcome {
            content,
            tokens_used: response.usage.total_tokens,
        })
    }

    async fn embed(&self, text: &str) -> Result<EmbedOutcome, LlmError> {
        self.request_gate.acquire().await;
        self.token_gate.acquire_n(estimate_tokens(text)).await;

        let request = EmbeddingRequest {
            model: self.embedding_model.clone(),
            input: text.to_string(),
        };

        let response = (|| async { self.post_embeddings(&request).await })
            .retry(self.retry_policy)
            .when(|e: &LlmError| e.is_retryable())
            .notify(|err, dur: Duration| {
                error!("LLM embed retrying error {} with sleeping {:?}", err, dur);
            })
            .await?;

        let embedding = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(LlmError::EmptyResponse)?;

        if embedding.len() != EMBEDDING_DIM {
            return Err(LlmError::EmbeddingDimension {
                expected: EMBEDDING_DIM,
                got: embedding.len(),
            });
        }

        Ok(EmbedOutcome {
            embedding,
            tokens_used: response.usage.total_tokens,
        })
    }
}
