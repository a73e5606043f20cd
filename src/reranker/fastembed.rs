//! Cross-encoder reranker backed by FastEmbed's `TextRerank`

use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use fastembed::{RerankInitOptions, RerankerModel, TextRerank};

use super::{RerankDocument, Reranker};

pub const DEFAULT_MODEL: &str = "BAAI/bge-reranker-v2-m3";

pub struct CrossEncoderReranker {
    model: Mutex<TextRerank>,
    top_k: usize,
}

fn resolve_model(name: &str) -> Result<RerankerModel> {
    match name {
        "BAAI/bge-reranker-base" => Ok(RerankerModel::BGERerankerBase),
        "BAAI/bge-reranker-v2-m3" | "rozgo/bge-reranker-v2-m3" => {
            Ok(RerankerModel::BGERerankerV2M3)
        }
        _ => Err(anyhow!(
            "Unsupported reranker model: {}. Supported: BAAI/bge-reranker-base, BAAI/bge-reranker-v2-m3",
            name
        )),
    }
}

impl CrossEncoderReranker {
    pub fn new(model_name: &str, cache_dir: Option<&Path>, top_k: usize) -> Result<Self> {
        let mut options = RerankInitOptions::new(resolve_model(model_name)?);
        if let Some(path) = cache_dir {
            options = options.with_cache_dir(path.to_path_buf());
        }

        tracing::info!(model = model_name, "Loading cross-encoder reranker");
        let model = TextRerank::try_new(options)
            .map_err(|e| anyhow!("Failed to initialize reranker: {}", e))?;

        Ok(Self {
            model: Mutex::new(model),
            top_k,
        })
    }
}

#[async_trait]
impl Reranker for CrossEncoderReranker {
    async fn rerank(&self, query: &str, documents: &[RerankDocument]) -> Result<Vec<f32>> {
        if documents.is_empty() {
            return Ok(vec![]);
        }

        let texts: Vec<&str> = documents.iter().map(|d| d.text.as_str()).collect();
        let results = {
            let mut model = self
                .model
                .lock()
                .map_err(|_| anyhow!("reranker model lock poisoned"))?;
            model
                .rerank(query, texts, false, None)
                .map_err(|e| anyhow!("Reranking failed: {}", e))?
        };

        let mut scores = vec![f32::NEG_INFINITY; documents.len()];
        for result in results {
            if let Some(slot) = scores.get_mut(result.index) {
                *slot = result.score;
            }
        }
        if scores.iter().any(|s| *s == f32::NEG_INFINITY) {
            return Err(anyhow!("reranker returned scores for only part of the documents"));
        }
        Ok(scores)
    }

    fn top_k(&self) -> usize {
        self.top_k
    }
}
