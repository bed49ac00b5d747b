//! Text generation provider trait.
//!
//! Concrete providers (Ollama chat, OpenAI-compatible chat) live in the
//! `ragchat` app crate. Calls are network-bound and may fail or time out;
//! the core maps those failures into [`RagError`](crate::error::RagError).

use anyhow::Result;
use async_trait::async_trait;

use crate::models::ChatMessage;

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"llama3.2:3b"`).
    fn model_name(&self) -> &str;

    /// Produce one completion for an ordered list of messages.
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Like [`generate`](GenerationProvider::generate) but with a single
    /// attempt: no retries on timeouts or transient errors. Used where the
    /// caller has its own fallback.
    async fn generate_once(&self, messages: &[ChatMessage]) -> Result<String> {
        self.generate(messages).await
    }
}
