//! Structured JSON replies from the language model

use serde_json::Value;

use super::{api_error, LanguageModel};
use crate::error::RefineError;
use crate::retry::RetryPolicy;

/// A required text field plus the optional `rationale` the prompts ask for
#[derive(Debug, Clone, PartialEq)]
pub struct JsonReply {
    pub value: String,
    pub rationale: Option<String>,
    pub raw: String,
}

/// Remove a surrounding Markdown code fence (with or without a language tag)
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim().to_string()
}

/// Parse `raw` as a JSON object and pull the non-empty string `field`
pub fn parse_reply(raw: &str, field: &'static str) -> Result<JsonReply, RefineError> {
    let cleaned = strip_code_fences(raw);
    let invalid = || RefineError::InvalidResponse {
        field,
        content: cleaned.clone(),
    };

    let value: Value = serde_json::from_str(&cleaned).map_err(|_| invalid())?;
    let text = value
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(invalid)?;
    let rationale = value
        .get("rationale")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(JsonReply {
        value: text.to_string(),
        rationale,
        raw: cleaned,
    })
}

/// Ask the model for a JSON object containing `field`. Transport errors and
/// unusable replies are both retried; the final failure keeps its kind.
pub async fn request_field(
    model: &dyn LanguageModel,
    policy: &RetryPolicy,
    operation: &str,
    prompt: &str,
    field: &'static str,
) -> Result<JsonReply, RefineError> {
    let result = policy
        .run(operation, || async move {
            let raw = model.generate(prompt).await?;
            Ok(parse_reply(&raw, field)?)
        })
        .await;

    result.map_err(|err| {
        if let Some(RefineError::InvalidResponse { field, content }) =
            err.last_error.downcast_ref::<RefineError>()
        {
            return RefineError::InvalidResponse {
                field: *field,
                content: content.clone(),
            };
        }
        let reason = match api_error(&err.last_error) {
            Some(api) => api.to_string(),
            None => format!("{:#}", err.last_error),
        };
        RefineError::LlmUnavailable {
            attempts: err.attempts,
            reason,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use test_case::test_case;

    struct Scripted(Mutex<Vec<Result<String>>>);

    #[async_trait]
    impl LanguageModel for Scripted {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            self.0.lock().unwrap().remove(0)
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    #[test_case("```json\n{\"a\":1}\n```", "{\"a\":1}"; "json fence")]
    #[test_case("```\n{\"a\":1}```", "{\"a\":1}"; "bare fence")]
    #[test_case("  {\"a\":1} ", "{\"a\":1}"; "no fence")]
    fn strips_fences(input: &str, expected: &str) {
        assert_eq!(strip_code_fences(input), expected);
    }

    #[test]
    fn parses_field_and_rationale() {
        let reply = parse_reply(
            r#"{"question": " Qual prazo? ", "rationale": "difere em dias"}"#,
            "question",
        )
        .unwrap();
        assert_eq!(reply.value, "Qual prazo?");
        assert_eq!(reply.rationale.as_deref(), Some("difere em dias"));
    }

    #[test]
    fn missing_field_is_invalid_response() {
        let err = parse_reply(r#"{"answer": ""}"#, "answer").unwrap_err();
        assert_eq!(err.kind(), "invalid_response");
        assert!(parse_reply("not json", "answer").is_err());
    }

    #[tokio::test]
    async fn retries_invalid_reply_then_succeeds() {
        let model = Scripted(Mutex::new(vec![
            Ok("sorry".to_string()),
            Ok(r#"{"answer":"30 dias"}"#.to_string()),
        ]));
        let policy = RetryPolicy::new(2, std::time::Duration::ZERO, std::time::Duration::from_secs(5));
        let reply = request_field(&model, &policy, "answer", "p", "answer")
            .await
            .unwrap();
        assert_eq!(reply.value, "30 dias");
    }

    #[tokio::test]
    async fn transport_failure_becomes_llm_unavailable() {
        let model = Scripted(Mutex::new(vec![Err(anyhow!("connection reset"))]));
        let err = request_field(&model, &RetryPolicy::immediate(), "question", "p", "question")
            .await
            .unwrap_err();
        assert!(matches!(err, RefineError::LlmUnavailable { attempts: 1, .. }));
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn exhausted_invalid_replies_keep_their_kind() {
        let model = Scripted(Mutex::new(vec![Ok("{}".to_string())]));
        let err = request_field(&model, &RetryPolicy::immediate(), "answer", "p", "answer")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_response");
    }
}
