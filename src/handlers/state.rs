//! Application state

use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::conversation::CandidatePipeline;
use crate::corpus::{Corpus, Qrel, Query};
use crate::embeddings::{create_embedder, Embedder};
use crate::reranker::{create_reranker, Reranker};
use crate::retrieval::lexical::LexicalIndex;
use crate::retrieval::semantic::{EmbeddingCache, SemanticScorer, SharedEmbedder};
use crate::retrieval::Retriever;
use crate::storage::csv::{load_documents, load_intents, load_qrels, load_queries};

/// Records loaded once per run
#[derive(Debug, Clone)]
pub struct Dataset {
    pub corpus: Arc<Corpus>,
    pub queries: Arc<Vec<Query>>,
    /// Empty when `qrel.csv` is absent
    pub qrels: Arc<Vec<Qrel>>,
}

impl Dataset {
    /// Load documents and queries (fatal when missing), intents and qrels
    /// when present.
    pub fn load(config: &Config) -> Result<Self> {
        let docs = load_documents(&config.doc_csv)
            .with_context(|| format!("Failed to load documents from {}", config.doc_csv.display()))?;
        let (corpus, duplicates) = Corpus::new(docs.records);
        for dup in &duplicates {
            tracing::warn!(doc_id = %dup.id, "Duplicate document id; keeping the first occurrence");
        }
        if corpus.is_empty() {
            return Err(anyhow!("No documents loaded from {}", config.doc_csv.display()));
        }

        let queries = load_queries(&config.query_csv)
            .with_context(|| format!("Failed to load queries from {}", config.query_csv.display()))?;

        let intents = if config.intent_csv.exists() {
            load_intents(&config.intent_csv)?
        } else {
            tracing::info!(path = %config.intent_csv.display(), "No intent file; auto-answers will be unavailable");
            Default::default()
        };
        let skipped_queries = queries.skipped;
        let queries: Vec<Query> = queries
            .records
            .into_iter()
            .map(|q| match intents.get(&q.id) {
                Some(intent) => q.with_intent(intent.clone()),
                None => q,
            })
            .collect();

        let qrels = load_optional_qrels(&config.qrel_csv)?;

        tracing::info!(
            documents = corpus.len(),
            skipped_documents = docs.skipped,
            duplicate_documents = duplicates.len(),
            queries = queries.len(),
            skipped_queries,
            intents = intents.len(),
            qrels = qrels.len(),
            "Dataset loaded"
        );

        Ok(Self {
            corpus: Arc::new(corpus),
            queries: Arc::new(queries),
            qrels: Arc::new(qrels),
        })
    }

    /// The first `n` queries, or all of them when `n` is 0
    pub fn first_queries(&self, n: usize) -> &[Query] {
        if n == 0 || n >= self.queries.len() {
            &self.queries
        } else {
            &self.queries[..n]
        }
    }
}

pub fn load_optional_qrels(path: &Path) -> Result<Vec<Qrel>> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "No qrel file; metrics will be skipped");
        return Ok(Vec::new());
    }
    let report = load_qrels(path)
        .with_context(|| format!("Failed to load qrels from {}", path.display()))?;
    if report.skipped > 0 {
        tracing::warn!(skipped = report.skipped, "Some qrel rows were skipped");
    }
    Ok(report.records)
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub dataset: Dataset,
    pub pipeline: CandidatePipeline,
}

impl AppState {
    /// Build every shared structure from configuration: corpus, BM25 index,
    /// embedding cache, retriever and reranker.
    pub async fn init(config: Config) -> Result<Self> {
        let dataset = Dataset::load(&config)?;

        let embedder = create_embedder(
            config.embeddings_backend,
            config.embeddings_model_dir.as_deref(),
            config.embeddings_model_repo.as_deref(),
            config.hash_embedding_dim,
        )
        .context("Failed to initialize embedder")?;

        let reranker = create_reranker(
            config.reranker_backend,
            config.reranker_model.as_deref(),
            config.embeddings_model_dir.as_deref(),
            config.fusion_top_k,
            config.reranker_cache_size,
        )
        .context("Failed to initialize reranker")?;

        Self::from_parts(config, dataset, embedder, reranker).await
    }

    /// Assemble state around already constructed capabilities
    pub async fn from_parts(
        config: Config,
        dataset: Dataset,
        embedder: Box<dyn Embedder + Send>,
        reranker: Option<Arc<dyn Reranker>>,
    ) -> Result<Self> {
        let lexical = Arc::new(LexicalIndex::build(
            &dataset.corpus,
            &config.lexical_extra_fields,
            config.bm25_params(),
        ));

        let policy = config.retry_policy();
        let embedder: SharedEmbedder = Arc::new(Mutex::new(embedder));
        let cache = EmbeddingCache::build(
            &dataset.corpus,
            &embedder,
            config.embedding_batch_size,
            &policy,
        )
        .await?;

        let semantic = SemanticScorer::new(Arc::new(cache), embedder, policy.clone());
        let retriever = Retriever::new(
            dataset.corpus.clone(),
            lexical,
            semantic,
            config.fusion_params(),
        );
        let pipeline = CandidatePipeline::new(retriever, reranker, policy);

        Ok(Self {
            config: Arc::new(config),
            dataset,
            pipeline,
        })
    }
}
