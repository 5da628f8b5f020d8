//! OpenAI-compatible chat endpoint prompted to emit hierarchical tags.

use std::time::Duration;

use serde::Deserialize;

use engram_core::config::TagConfig;
use engram_core::errors::{EngramError, EngramResult};
use engram_core::traits::{TagExtractor, TagPayload};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const SYSTEM_PROMPT: &str = "You label text with hierarchical tags. Tags are \
colon-delimited, lowercase alphanumerics plus hyphen, at most four levels, \
e.g. database:postgresql:performance. Reuse existing tags when they fit. \
Reply with a comma-separated list of tags and nothing else.";

pub struct OpenAiTagExtractor {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl OpenAiTagExtractor {
    pub fn new(config: &TagConfig) -> EngramResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| EngramError::InvalidInput("tag.api_key is required".to_string()))?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| EngramError::TagError(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            model: config.model.clone(),
        })
    }
}

impl TagExtractor for OpenAiTagExtractor {
    fn extract(&self, text: &str, existing_sample: &[String]) -> EngramResult<TagPayload> {
        let mut user_prompt = String::new();
        if !existing_sample.is_empty() {
            user_prompt.push_str("Existing tags: ");
            user_prompt.push_str(&existing_sample.join(", "));
            user_prompt.push_str("\n\n");
        }
        user_prompt.push_str("Text:\n");
        user_prompt.push_str(text);

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.model,
                "messages": [
                    { "role": "system", "content": SYSTEM_PROMPT },
                    { "role": "user", "content": user_prompt },
                ],
                "temperature": 0.0,
            }))
            .send()
            .map_err(|e| EngramError::TagError(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(EngramError::TagError(format!(
                "endpoint returned {}",
                response.status()
            )));
        }

        let body: ChatResponse = response
            .json()
            .map_err(|e| EngramError::TagError(format!("malformed response: {e}")))?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| EngramError::TagError("response carried no choices".to_string()))?;

        Ok(TagPayload::Delimited(content))
    }

    fn name(&self) -> &str {
        "openai"
    }
}
