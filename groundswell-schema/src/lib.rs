pub mod forum;
pub mod openai;

pub use forum::{ForumListing, ForumPost, ListingEnvelope, SortMethod, TimeFilter};
pub use openai::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, EmbeddingRequest,
    EmbeddingResponse,
};
