//! Embedder backed by an LLM provider's embeddings endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use taskwright_core::error::MemoryError;
use taskwright_core::provider::EmbeddingRequest;
use taskwright_core::{Embedder, Provider};

/// Embeds text through `Provider::embed` with a fixed model.
pub struct ProviderEmbedder {
    provider: Arc<dyn Provider>,
    model: String,
}

impl ProviderEmbedder {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for ProviderEmbedder {
    fn name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MemoryError> {
        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.model.clone(),
                inputs: texts.to_vec(),
            })
            .await
            .map_err(|e| MemoryError::EmbeddingFailed(e.to_string()))?;

        if response.embeddings.len() != texts.len() {
            return Err(MemoryError::EmbeddingFailed(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                response.embeddings.len()
            )));
        }
        Ok(response.embeddings)
    }
}
