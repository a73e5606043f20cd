//! Cross-encoder style scoring of (query, document) pairs

pub mod cache;
pub mod fastembed;
pub mod overlap;

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::config::RerankerBackend;

/// Trait for scoring candidate documents against a query
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Returns one score per document, in input order (higher = more relevant)
    async fn rerank(&self, query: &str, documents: &[RerankDocument]) -> Result<Vec<f32>>;

    /// Maximum number of leading candidates scored per call; later
    /// candidates keep their incoming order
    fn top_k(&self) -> usize;
}

/// Document representation for reranking
#[derive(Debug, Clone)]
pub struct RerankDocument {
    pub id: String,
    pub text: String,
}

/// Create a reranker based on config. `None` disables reranking.
pub fn create_reranker(
    backend: RerankerBackend,
    model: Option<&str>,
    cache_dir: Option<&Path>,
    top_k: usize,
    cache_size: usize,
) -> Result<Option<Arc<dyn Reranker>>> {
    let inner: Box<dyn Reranker> = match backend {
        RerankerBackend::None => {
            tracing::info!("Reranking disabled");
            return Ok(None);
        }
        RerankerBackend::FastEmbed => Box::new(fastembed::CrossEncoderReranker::new(
            model.unwrap_or(fastembed::DEFAULT_MODEL),
            cache_dir,
            top_k,
        )?),
        RerankerBackend::Overlap => Box::new(overlap::OverlapReranker::new(top_k)),
    };

    if cache_size == 0 {
        return Ok(Some(Arc::from(inner)));
    }
    Ok(Some(Arc::new(cache::CachedReranker::new(inner, cache_size))))
}
