//! Text-generation backend seam.
//!
//! The runtime only needs `generate(prompt, temperature, max_tokens)`.
//! Async backends implement [`TextGenerator`] directly; blocking ones
//! implement [`BlockingTextGenerator`] and are wrapped in [`Blocking`],
//! which moves each call onto Tokio's blocking pool so other agents keep
//! running.

use std::sync::Arc;

use async_trait::async_trait;

/// Error type for generation backends
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Text generation failed: {0}")]
pub struct GenerationError(pub String);

impl GenerationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Async text-generation backend.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, GenerationError>;
}

/// Synchronous text-generation backend.
pub trait BlockingTextGenerator: Send + Sync + 'static {
    fn generate(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, GenerationError>;
}

/// Runs a [`BlockingTextGenerator`] off the async workers.
pub struct Blocking<G> {
    inner: Arc<G>,
}

impl<G: BlockingTextGenerator> Blocking<G> {
    pub fn new(generator: G) -> Self {
        Self {
            inner: Arc::new(generator),
        }
    }
}

#[async_trait]
impl<G: BlockingTextGenerator> TextGenerator for Blocking<G> {
    async fn generate(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, GenerationError> {
        let generator = Arc::clone(&self.inner);
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || generator.generate(&prompt, temperature, max_tokens))
            .await
            .map_err(|e| GenerationError::new(format!("blocking generation task failed: {}", e)))?
    }
}
