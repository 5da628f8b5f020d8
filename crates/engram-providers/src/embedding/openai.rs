//! OpenAI-compatible embedding endpoint over blocking HTTP.

use std::time::Duration;

use serde::Deserialize;

use engram_core::config::EmbeddingConfig;
use engram_core::errors::{EngramError, EngramResult};
use engram_core::traits::EmbeddingProvider;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiEmbeddings {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

impl OpenAiEmbeddings {
    pub fn new(config: &EmbeddingConfig) -> EngramResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| EngramError::InvalidInput("embedding.api_key is required".to_string()))?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| EngramError::EmbeddingError(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            model: config.model.clone(),
            dimensions: config.dimensions,
        })
    }
}

impl EmbeddingProvider for OpenAiEmbeddings {
    fn embed(&self, text: &str) -> EngramResult<Vec<f32>> {
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.model,
                "input": text,
            }))
            .send()
            .map_err(|e| EngramError::EmbeddingError(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(EngramError::EmbeddingError(format!(
                "endpoint returned {}",
                response.status()
            )));
        }

        let body: EmbeddingsResponse = response
            .json()
            .map_err(|e| EngramError::EmbeddingError(format!("malformed response: {e}")))?;
        let embedding = body
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EngramError::EmbeddingError("response carried no data".to_string()))?;

        if embedding.len() != self.dimensions {
            return Err(EngramError::EmbeddingError(format!(
                "expected {} dimensions, got {}",
                self.dimensions,
                embedding.len()
            )));
        }
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "openai"
    }
}
