//! Wire schema for the OpenAI-compatible chat and embeddings endpoints.

mod chat;
mod embeddings;

pub use chat::{
    ChatChoice, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ResponseFormat,
    Usage,
};
pub use embeddings::{EmbeddingData, EmbeddingRequest, EmbeddingResponse, EmbeddingUsage};
