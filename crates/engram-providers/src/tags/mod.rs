//! Tag extractor implementations and selection.

pub mod fallback;
pub mod openai;

use std::sync::Arc;

use engram_core::config::TagConfig;
use engram_core::errors::EngramResult;
use engram_core::traits::TagExtractor;

pub use fallback::KeywordTagExtractor;
pub use openai::OpenAiTagExtractor;

/// Select the tag extractor at configuration load.
pub fn create_tag_extractor(config: &TagConfig) -> EngramResult<Arc<dyn TagExtractor>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiTagExtractor::new(config)?)),
        "fallback" => Ok(Arc::new(KeywordTagExtractor)),
        other => {
            tracing::warn!(provider = other, "unknown tag provider, using fallback");
            Ok(Arc::new(KeywordTagExtractor))
        }
    }
}
