//! Google Gemini `generateContent` client

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::{ApiError, LanguageModel};

const ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GeminiModel {
    client: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl GeminiModel {
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

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {
                "responseMimeType": "application/json",
                "temperature": self.temperature,
                "maxOutputTokens": self.max_tokens,
            },
        })
    }
}

#[async_trait]
impl LanguageModel for GeminiModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/{}:generateContent", ENDPOINT, self.model);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(prompt))
            .send()
            .await
            .context("Gemini API request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError {
                provider: "Gemini",
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let parsed: GeminiResponse = response
            .json()
            .await
            .context("Failed to parse Gemini response")?;
        first_text(&parsed).context("Gemini response contains no generated text")
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn first_text(response: &GeminiResponse) -> Option<String> {
    response
        .candidates
        .iter()
        .filter_map(|c| c.content.as_ref())
        .flat_map(|content| content.parts.iter())
        .filter_map(|part| part.text.as_deref())
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_non_empty_part() {
        let parsed: GeminiResponse = serde_json::from_str(
            r#"{"candidates":[
                {"content":{"parts":[{"text":"  "}]}},
                {"content":{"parts":[{"text":" {\"answer\":\"30 dias\"} "}]}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(first_text(&parsed).unwrap(), r#"{"answer":"30 dias"}"#);
    }

    #[test]
    fn blocked_response_has_no_text() {
        let parsed: GeminiResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        assert!(first_text(&parsed).is_none());
    }

    #[test]
    fn body_requests_json_output() {
        let model = GeminiModel::new(
            reqwest::Client::new(),
            "key".to_string(),
            "gemini-2.5-flash-lite".to_string(),
            0.2,
            1024,
        );
        let body = model.request_body("olá");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 1024);
        assert_eq!(body["contents"][0]["parts"][0]["text"], "olá");
    }
}
