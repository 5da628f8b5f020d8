//! Capability traits for the external callables the core consumes.
//!
//! The LLM bindings themselves live outside the core; these traits are the
//! seams they plug into. Concrete implementations are in `engram-providers`.

use crate::errors::EngramResult;

/// Computes a dense embedding vector for a piece of text.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed `text`. The returned vector must have exactly `dimensions()`
    /// entries; callers validate and reject anything else.
    fn embed(&self, text: &str) -> EngramResult<Vec<f32>>;

    /// The model's output dimension.
    fn dimensions(&self) -> usize;

    fn name(&self) -> &str;
}

/// Raw tag-extractor output: providers may return either a list or a
/// single delimited string; the tag service normalises both.
#[derive(Debug, Clone, PartialEq)]
pub enum TagPayload {
    List(Vec<String>),
    Delimited(String),
}

/// Extracts hierarchical tags from text, given a sample of existing tag
/// names to encourage vocabulary reuse.
pub trait TagExtractor: Send + Sync {
    fn extract(&self, text: &str, existing_sample: &[String]) -> EngramResult<TagPayload>;

    fn name(&self) -> &str;
}

/// Counts tokens in a piece of text. Must not fail; implementations fall
/// back to a word count when the tokenizer is unavailable.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}
