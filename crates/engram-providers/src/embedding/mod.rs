//! Embedding provider implementations and selection.

pub mod fallback;
pub mod openai;

use std::sync::Arc;

use engram_core::config::EmbeddingConfig;
use engram_core::errors::EngramResult;
use engram_core::traits::EmbeddingProvider;

pub use fallback::HashEmbeddings;
pub use openai::OpenAiEmbeddings;

/// Select the embedding provider at configuration load. Unknown provider
/// names fall back to the deterministic hash provider with a warning.
pub fn create_embedding_provider(
    config: &EmbeddingConfig,
) -> EngramResult<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiEmbeddings::new(config)?)),
        "fallback" => Ok(Arc::new(HashEmbeddings::new(config.dimensions))),
        other => {
            tracing::warn!(provider = other, "unknown embedding provider, using fallback");
            Ok(Arc::new(HashEmbeddings::new(config.dimensions)))
        }
    }
}
