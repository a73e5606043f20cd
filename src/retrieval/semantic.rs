//! Dense similarity between a query and the cached document embeddings

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::Mutex;

use crate::corpus::Corpus;
use crate::embeddings::{cosine, Embedder};
use crate::error::RefineError;
use crate::retry::RetryPolicy;

pub type SharedEmbedder = Arc<Mutex<Box<dyn Embedder + Send>>>;

/// Document vectors keyed by id. Built once per corpus load and read-only
/// afterwards; only statement text is embedded.
#[derive(Debug, Default)]
pub struct EmbeddingCache {
    vectors: HashMap<String, Vec<f32>>,
    dim: usize,
}

impl EmbeddingCache {
    pub async fn build(
        corpus: &Corpus,
        embedder: &SharedEmbedder,
        batch_size: usize,
        policy: &RetryPolicy,
    ) -> Result<Self, RefineError> {
        let batch_size = batch_size.max(1);
        let dim = embedder.lock().await.dim();
        let mut vectors = HashMap::with_capacity(corpus.len());

        for (batch_idx, chunk) in corpus.documents().chunks(batch_size).enumerate() {
            let texts: Vec<String> = chunk.iter().map(|doc| doc.text.clone()).collect();
            let texts = &texts;

            let embedded = policy
                .run("embed_documents", || async move {
                    let out = embedder.lock().await.embed(texts)?;
                    if out.len() != texts.len() {
                        return Err(anyhow!(
                            "embedder returned {} vectors for {} texts",
                            out.len(),
                            texts.len()
                        ));
                    }
                    Ok(out)
                })
                .await
                .map_err(|err| RefineError::EmbeddingFailure {
                    reason: err.to_string(),
                })?;

            for (doc, vector) in chunk.iter().zip(embedded) {
                vectors.insert(doc.id.clone(), vector);
            }
            tracing::debug!(batch = batch_idx, size = chunk.len(), "Embedded document batch");
        }

        tracing::info!(documents = vectors.len(), dim, "Document embeddings cached");
        Ok(Self { vectors, dim })
    }

    pub fn from_vectors(vectors: HashMap<String, Vec<f32>>, dim: usize) -> Self {
        Self { vectors, dim }
    }

    pub fn get(&self, doc_id: &str) -> Option<&[f32]> {
        self.vectors.get(doc_id).map(Vec::as_slice)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Cosine between two cached documents
    pub fn similarity(&self, a: &str, b: &str) -> Option<f32> {
        Some(cosine(self.get(a)?, self.get(b)?))
    }
}

#[derive(Clone)]
pub struct SemanticScorer {
    cache: Arc<EmbeddingCache>,
    embedder: SharedEmbedder,
    policy: RetryPolicy,
}

impl SemanticScorer {
    pub fn new(cache: Arc<EmbeddingCache>, embedder: SharedEmbedder, policy: RetryPolicy) -> Self {
        Self {
            cache,
            embedder,
            policy,
        }
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    /// Cosine of the query against every cached document
    pub async fn score(&self, query: &str) -> Result<HashMap<String, f32>> {
        let input = vec![query.to_string()];
        let input = &input;
        let embedder = &self.embedder;

        let mut out = self
            .policy
            .run("embed_query", || async move {
                embedder.lock().await.embed(input)
            })
            .await?;
        let query_vec = out
            .pop()
            .ok_or_else(|| anyhow!("embedder returned no vector for the query"))?;

        Ok(self
            .cache
            .vectors
            .iter()
            .map(|(id, vector)| (id.clone(), cosine(&query_vec, vector)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Document;
    use crate::embeddings::hash::HashEmbedder;

    struct BrokenEmbedder;

    impl Embedder for BrokenEmbedder {
        fn dim(&self) -> usize {
            4
        }

        fn embed(&mut self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(anyhow!("model file missing"))
        }
    }

    fn shared(embedder: impl Embedder + Send + 'static) -> SharedEmbedder {
        Arc::new(Mutex::new(Box::new(embedder)))
    }

    fn corpus() -> Corpus {
        Corpus::from_documents(vec![
            Document::new("D1", "prazo recursal 15 dias"),
            Document::new("D2", "prazo recursal 30 dias"),
            Document::new("D3", "competência do tribunal"),
        ])
    }

    #[tokio::test]
    async fn cache_holds_every_document() {
        let embedder = shared(HashEmbedder::new(64));
        let cache = EmbeddingCache::build(&corpus(), &embedder, 2, &RetryPolicy::immediate())
            .await
            .unwrap();
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.dim(), 64);
        assert!(cache.similarity("D1", "D2").unwrap() > cache.similarity("D1", "D3").unwrap());
        assert!(cache.similarity("D1", "missing").is_none());
    }

    #[tokio::test]
    async fn build_failure_is_embedding_failure() {
        let err = EmbeddingCache::build(
            &corpus(),
            &shared(BrokenEmbedder),
            8,
            &RetryPolicy::immediate(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "embedding_failure");
        assert!(err.to_string().contains("model file missing"));
    }

    #[tokio::test]
    async fn query_scores_lie_in_cosine_range() {
        let embedder = shared(HashEmbedder::new(64));
        let cache = EmbeddingCache::build(&corpus(), &embedder, 8, &RetryPolicy::immediate())
            .await
            .unwrap();
        let scorer = SemanticScorer::new(Arc::new(cache), embedder, RetryPolicy::immediate());

        let scores = scorer.score("qual o prazo para recurso?").await.unwrap();
        assert_eq!(scores.len(), 3);
        assert!(scores.values().all(|s| (-1.0..=1.0001).contains(s)));
        assert!(scores["D1"] > scores["D3"]);
    }
}
