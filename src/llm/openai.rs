//! OpenAI chat completions client

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::{ApiError, LanguageModel};

pub struct OpenAiModel {
    client: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiModel {
    pub fn new(
        client: reqwest::Client,
        api_key: String,
        model: String,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            client,
            api_key,
            model,
            temperature,
            max_tokens,
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({
                "model": self.model,
                "messages": [{"role": "user", "content": prompt}],
                "max_tokens": self.max_tokens,
                "temperature": self.temperature,
                "response_format": {"type": "json_object"},
            }))
            .send()
            .await
            .context("OpenAI API request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError {
                provider: "OpenAI",
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let parsed: OpenAIResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI response")?;

        parsed
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .context("OpenAI response contains no message content")
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
}
