pub mod fusion;
pub mod lexical;
pub mod rerank;
pub mod semantic;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::corpus::{Corpus, Query};
use crate::retrieval::fusion::{fuse, FusedRanking, FusionParams};
use crate::retrieval::lexical::LexicalIndex;
use crate::retrieval::semantic::SemanticScorer;

/// Fused top-K for one query plus any degradations worth recording
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub ranking: FusedRanking,
    pub notes: Vec<String>,
}

/// Hybrid lexical + semantic retrieval over a loaded corpus
#[derive(Clone)]
pub struct Retriever {
    corpus: Arc<Corpus>,
    lexical: Arc<LexicalIndex>,
    semantic: SemanticScorer,
    params: FusionParams,
}

impl Retriever {
    pub fn new(
        corpus: Arc<Corpus>,
        lexical: Arc<LexicalIndex>,
        semantic: SemanticScorer,
        params: FusionParams,
    ) -> Self {
        Self {
            corpus,
            lexical,
            semantic,
            params,
        }
    }

    pub fn corpus(&self) -> &Arc<Corpus> {
        &self.corpus
    }

    pub fn semantic(&self) -> &SemanticScorer {
        &self.semantic
    }

    pub fn params(&self) -> &FusionParams {
        &self.params
    }

    /// Score the query on both signals and fuse them. A failed query
    /// embedding degrades to lexical-only fusion and is noted.
    pub async fn retrieve(&self, query: &Query) -> Retrieval {
        let started = Instant::now();
        let mut notes = Vec::new();

        let lexical = self.lexical.score(&query.text);
        let keyword_ms = started.elapsed().as_millis() as u64;

        let semantic = match self.semantic.score(&query.text).await {
            Ok(scores) => scores,
            Err(err) => {
                tracing::warn!(query_id = %query.id, error = %err, "Semantic scoring failed; using lexical only");
                notes.push(format!("semantic_unavailable: {err}"));
                HashMap::new()
            }
        };

        let ranking = fuse(&query.id, &lexical, &semantic, &self.params);
        tracing::debug!(
            query_id = %query.id,
            candidates = ranking.len(),
            keyword_ms,
            total_ms = started.elapsed().as_millis() as u64,
            "Fused candidates"
        );

        Retrieval { ranking, notes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Document;
    use crate::embeddings::{hash::HashEmbedder, Embedder};
    use crate::retrieval::lexical::Bm25Params;
    use crate::retrieval::semantic::{EmbeddingCache, SharedEmbedder};
    use crate::retry::RetryPolicy;
    use tokio::sync::Mutex;

    struct FailingAfterLoad {
        inner: HashEmbedder,
        loaded: bool,
    }

    impl Embedder for FailingAfterLoad {
        fn dim(&self) -> usize {
            self.inner.dim()
        }

        fn embed(&mut self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            if self.loaded {
                anyhow::bail!("quota exceeded");
            }
            self.loaded = true;
            self.inner.embed(texts)
        }
    }

    async fn retriever(embedder: SharedEmbedder) -> Retriever {
        let corpus = Arc::new(Corpus::from_documents(vec![
            Document::new("D1", "prazo recursal 15 dias"),
            Document::new("D2", "prazo recursal 30 dias"),
            Document::new("D3", "competência do tribunal"),
        ]));
        let lexical = Arc::new(LexicalIndex::build(&corpus, &[], Bm25Params::default()));
        let cache = EmbeddingCache::build(&corpus, &embedder, 16, &RetryPolicy::immediate())
            .await
            .unwrap();
        let semantic = SemanticScorer::new(Arc::new(cache), embedder, RetryPolicy::immediate());
        Retriever::new(corpus, lexical, semantic, FusionParams::default())
    }

    #[tokio::test]
    async fn fuses_both_signals() {
        let embedder: SharedEmbedder = Arc::new(Mutex::new(Box::new(HashEmbedder::new(64))));
        let retrieval = retriever(embedder)
            .await
            .retrieve(&Query::new("1", "qual o prazo para recurso?"))
            .await;

        assert!(retrieval.notes.is_empty());
        assert_eq!(retrieval.ranking.doc_ids()[2], "D3");
    }

    #[tokio::test]
    async fn semantic_failure_degrades_to_lexical() {
        let embedder: SharedEmbedder = Arc::new(Mutex::new(Box::new(FailingAfterLoad {
            inner: HashEmbedder::new(64),
            loaded: false,
        })));
        let retrieval = retriever(embedder)
            .await
            .retrieve(&Query::new("1", "qual o prazo para recurso?"))
            .await;

        assert_eq!(retrieval.notes.len(), 1);
        assert!(retrieval.notes[0].starts_with("semantic_unavailable"));
        assert_eq!(retrieval.ranking.doc_ids(), vec!["D1", "D2", "D3"]);
    }
}
