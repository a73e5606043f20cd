//! Test helper functions for integration tests
//!
//! Scripted capabilities and file helpers. These are not rstest fixtures;
//! call them directly.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use juris_refine::llm::LanguageModel;
use juris_refine::reranker::{RerankDocument, Reranker};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const SCRIPTED_QUESTION: &str = "O prazo de interesse é de quinze ou de trinta dias?";
pub const SCRIPTED_ANSWER: &str = "30 dias";

/// Language model that answers by prompt kind: answer prompts (carrying a
/// BACKGROUND) get [`SCRIPTED_ANSWER`], intent prompts get a fixed intent,
/// everything else gets [`SCRIPTED_QUESTION`]. Every prompt is recorded.
#[derive(Default)]
pub struct ScriptedLlm {
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Prompts that asked for a clarifying question
    pub fn question_prompts(&self) -> Vec<String> {
        self.prompts()
            .into_iter()
            .filter(|p| p.contains("clarifying question"))
            .collect()
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let reply = if prompt.contains("BACKGROUND:") {
            format!(r#"{{"answer": "{SCRIPTED_ANSWER}"}}"#)
        } else if prompt.contains("Documentos ideais") {
            r#"{"intent": "Saber o prazo do recurso", "rationale": "documentos sobre prazo"}"#
                .to_string()
        } else {
            format!(
                "```json\n{{\"question\": \"{SCRIPTED_QUESTION}\", \"rationale\": \"os casos diferem no prazo\"}}\n```"
            )
        };
        Ok(reply)
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Reranker that always fails and counts its calls
#[derive(Default)]
pub struct FailingReranker {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Reranker for FailingReranker {
    async fn rerank(&self, _query: &str, _documents: &[RerankDocument]) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Err(anyhow!("cross-encoder unavailable"))
    }

    fn top_k(&self) -> usize {
        20
    }
}

/// Write a small CSV file from literal lines
pub fn write_file(path: &Path, lines: &[&str]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, lines.join("\n") + "\n").unwrap();
}

/// Data rows of a CSV as string vectors (header excluded)
pub fn read_csv(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let headers = reader
        .headers()
        .unwrap()
        .iter()
        .map(str::to_string)
        .collect();
    let rows = reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect();
    (headers, rows)
}
