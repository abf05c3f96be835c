use serde::{Deserialize, Serialize};

/// Enrichment pipeline configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// LLM provider base URL (OpenAI-compatible).
    /// TOML: `pipeline.llm_api_base`. Default: `https://api.openai.com`.
    #[serde(default = "default_llm_api_base")]
    pub llm_api_base: String,

    /// LLM API key. Required for `server`/`worker` modes.
    /// TOML: `pipeline.llm_api_key`.
    #[serde(default)]
    pub llm_api_key: String,

    /// Chat model used by verdict stages.
    /// TOML: `pipeline.chat_model`. Default: `gpt-4o-mini`.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Embedding model used by the semantic stage.
    /// TOML: `pipeline.embedding_model`. Default: `text-embedding-3-small`.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Concurrent posts in flight through the pipeline.
    /// TOML: `pipeline.orch_concurrency`. Default: `5`.
    #[serde(default = "default_orch_concurrency")]
    pub orch_concurrency: usize,

    /// Cosine similarity threshold for joining an existing cluster.
    /// TOML: `pipeline.cluster_similarity_threshold`. Default: `0.7`.
    #[serde(default = "default_cluster_similarity_threshold")]
    pub cluster_similarity_threshold: f32,

    /// Pairwise centroid similarity above which clusters are merged.
    /// TOML: `pipeline.cluster_merge_threshold`. Default: `0.95`.
    #[serde(default = "default_cluster_merge_threshold")]
    pub cluster_merge_threshold: f32,

    /// LLM token budget per minute.
    /// TOML: `pipeline.max_tokens_per_minute`. Default: `100_000`.
    #[serde(default = "default_max_tokens_per_minute")]
    pub max_tokens_per_minute: u32,

    /// LLM request budget per minute.
    /// TOML: `pipeline.max_requests_per_minute`. Default: `100`.
    #[serde(default = "default_max_requests_per_minute")]
    pub max_requests_per_minute: u32,

    /// Max retry attempts for one LLM call.
    /// TOML: `pipeline.retry_attempts`. Default: `3`.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,

    /// Base retry delay for LLM calls, milliseconds (doubles per attempt).
    /// TOML: `pipeline.retry_delay_ms`. Default: `1000`.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Batch size for centroid recomputation jobs.
    /// TOML: `pipeline.centroid_update_batch_size`. Default: `100`.
    #[serde(default = "default_centroid_update_batch_size")]
    pub centroid_update_batch_size: usize,

    /// Clusters smaller than this are skipped by trend interaction contracts.
    /// TOML: `pipeline.min_cluster_size`. Default: `5`.
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: i64,

    /// Queue job attempts before a post is marked failed.
    /// TOML: `pipeline.job_attempts`. Default: `3`.
    #[serde(default = "default_job_attempts")]
    pub job_attempts: i64,

    /// Base backoff for queue retries, milliseconds (doubles per attempt).
    /// TOML: `pipeline.job_backoff_ms`. Default: `2000`.
    #[serde(default = "default_job_backoff_ms")]
    pub job_backoff_ms: u64,

    /// Refill the queue when `waiting + active` drops to this threshold.
    /// TOML: `pipeline.refill_low_threshold`. Default: `3`.
    #[serde(default = "default_refill_low_threshold")]
    pub refill_low_threshold: u64,

    /// Max unprocessed posts pulled per refill.
    /// TOML: `pipeline.refill_batch_size`. Default: `25`.
    #[serde(default = "default_refill_batch_size")]
    pub refill_batch_size: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            llm_api_base: default_llm_api_base(),
            llm_api_key: String::new(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            orch_concurrency: default_orch_concurrency(),
            cluster_similarity_threshold: default_cluster_similarity_threshold(),
            cluster_merge_threshold: default_cluster_merge_threshold(),
            max_tokens_per_minute: default_max_tokens_per_minute(),
            max_requests_per_minute: default_max_requests_per_minute(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            centroid_update_batch_size: default_centroid_update_batch_size(),
            min_cluster_size: default_min_cluster_size(),
            job_attempts: default_job_attempts(),
            job_backoff_ms: default_job_backoff_ms(),
            refill_low_threshold: default_refill_low_threshold(),
            refill_batch_size: default_refill_batch_size(),
        }
    }
}

fn default_llm_api_base() -> String {
    "https://api.openai.com".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_orch_concurrency() -> usize {
    5
}

fn default_cluster_similarity_threshold() -> f32 {
    0.7
}

fn default_cluster_merge_threshold() -> f32 {
    0.95
}

fn default_max_tokens_per_minute() -> u32 {
    100_000
}

fn default_max_requests_per_minute() -> u32 {
    100
}

fn default_retry_attempts() -> usize {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_centroid_update_batch_size() -> usize {
    100
}

fn default_min_cluster_size() -> i64 {
    5
}

fn default_job_attempts() -> i64 {
    3
}

fn default_job_backoff_ms() -> u64 {
    2000
}

fn default_refill_low_threshold() -> u64 {
    3
}

fn default_refill_batch_size() -> i64 {
    25
}
