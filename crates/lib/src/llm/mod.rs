//! LLM abstraction and the Gemini client.
//!
//! The relay only needs two things from a provider: confirm at startup that the model and
//! credentials are usable, and generate the next model turn for a history.

mod gemini;

pub use gemini::{GeminiClient, DEFAULT_GEMINI_BASE_URL};

use crate::session::Turn;
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("provider api error: {status} {body}")]
    Api { status: u16, body: String },
    #[error("malformed provider response: {0}")]
    Malformed(String),
    #[error("provider returned an empty reply")]
    EmptyReply,
}

/// A conversational model endpoint. Stateless: the caller owns the history.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Fails when the model does not exist or the credentials are rejected.
    async fn check_model(&self, model: &str) -> Result<(), ProviderError>;

    /// Generate the model's next turn for `history`, whose last entry is the pending user turn.
    async fn generate(&self, model: &str, history: &[Turn]) -> Result<String, ProviderError>;
}
