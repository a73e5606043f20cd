//! Language model capability used for clarifying questions, answers and
//! intent generation.

pub mod gemini;
pub mod json;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use thiserror::Error;

use crate::config::{LlmBackend, LlmConfig};

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete `prompt`, returning the raw response text
    async fn generate(&self, prompt: &str) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// Non-success HTTP status from a provider
#[derive(Debug, Error)]
#[error("{provider} API returned {status}: {body}")]
pub struct ApiError {
    pub provider: &'static str,
    pub status: u16,
    pub body: String,
}

impl ApiError {
    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }

    /// Rate limit that will not clear until the next day
    pub fn is_daily_quota(&self) -> bool {
        self.is_rate_limited()
            && (self.body.contains("PerDay") || self.body.to_lowercase().contains("per day"))
    }
}

/// Find an [`ApiError`] anywhere in an error chain
pub fn api_error(err: &anyhow::Error) -> Option<&ApiError> {
    err.chain().find_map(|cause| cause.downcast_ref::<ApiError>())
}

pub fn create_language_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    let api_key = config
        .api_key
        .clone()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| match config.backend {
            LlmBackend::Gemini => anyhow!("GOOGLE_API_KEY is not set"),
            LlmBackend::OpenAi => anyhow!("OPENAI_API_KEY is not set"),
        })?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(config.timeout_ms))
        .build()
        .map_err(|e| anyhow!("Failed to build HTTP client: {e}"))?;

    let model: Arc<dyn LanguageModel> = match config.backend {
        LlmBackend::Gemini => Arc::new(gemini::GeminiModel::new(
            client,
            api_key,
            config.model.clone(),
            config.temperature,
            config.max_tokens,
        )),
        LlmBackend::OpenAi => Arc::new(openai::OpenAiModel::new(
            client,
            api_key,
            config.model.clone(),
            config.temperature,
            config.max_tokens,
        )),
    };

    tracing::info!(backend = ?config.backend, model = model.model_name(), "Language model ready");
    Ok(model)
}
