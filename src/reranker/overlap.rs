//! Deterministic term-overlap scorer
//!
//! Scores a document by the share of distinct analyzed query terms it
//! contains. Needs no model, so it serves offline runs and tests.

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;

use super::{RerankDocument, Reranker};
use crate::text::analyze;

pub struct OverlapReranker {
    top_k: usize,
}

impl OverlapReranker {
    pub fn new(top_k: usize) -> Self {
        Self { top_k }
    }

    fn score(query_terms: &HashSet<String>, text: &str) -> f32 {
        if query_terms.is_empty() {
            return 0.0;
        }
        let doc_terms: HashSet<String> = analyze(text).into_iter().collect();
        let hits = query_terms.intersection(&doc_terms).count();
        hits as f32 / query_terms.len() as f32
    }
}

#[async_trait]
impl Reranker for OverlapReranker {
    async fn rerank(&self, query: &str, documents: &[RerankDocument]) -> Result<Vec<f32>> {
        let query_terms: HashSet<String> = analyze(query).into_iter().collect();
        Ok(documents
            .iter()
            .map(|doc| Self::score(&query_terms, &doc.text))
            .collect())
    }

    fn top_k(&self) -> usize {
        self.top_k
    }
}
