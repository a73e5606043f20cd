//! rstest fixtures for integration tests
//!
//! Configuration points at a unique temporary directory and uses the offline
//! backends (hash embeddings, overlap reranker) so no model is downloaded.
//!
//! # Usage
//!
//! ```rust
//! use crate::support::fixtures::*;
//!
//! #[rstest]
//! #[tokio::test]
//! async fn my_test(test_config: Config, scenario_dataset: Dataset) {
//!     let state = app_state(test_config, scenario_dataset, None).await;
//! }
//! ```

use juris_refine::{
    config::{Config, EmbeddingsBackend, LlmBackend, LlmConfig, RerankerBackend},
    corpus::{Corpus, Document, Query},
    embeddings::hash::HashEmbedder,
    handlers::{AppState, Dataset},
    reranker::{overlap::OverlapReranker, Reranker},
    retrieval::fusion::FusionMethod,
};
use rstest::*;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Unique counter for creating isolated test directories
static FIXTURE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Creates a unique temporary directory for test isolation
#[fixture]
pub fn tmp_dir() -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let c = FIXTURE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("juris-fixture-test-{nanos}-{c}"));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Configuration rooted at `tmp_dir` with offline backends, one attempt per
/// capability call and a single turn per session.
#[fixture]
pub fn test_config(tmp_dir: PathBuf) -> Config {
    let data_dir = tmp_dir.canonicalize().unwrap_or_else(|_| tmp_dir.clone());
    Config {
        doc_csv: data_dir.join("doc.csv"),
        query_csv: data_dir.join("query.csv"),
        qrel_csv: data_dir.join("qrel.csv"),
        intent_csv: data_dir.join("query_intencao.csv"),
        output_dir: data_dir.join("output"),
        data_dir,
        lexical_extra_fields: vec!["EXCERTO".to_string()],
        bm25_k1: 1.2,
        bm25_b: 0.75,
        fusion_method: FusionMethod::MinMax,
        hybrid_alpha: 0.5,
        candidate_pool: 100,
        rrf_k: 60.0,
        fusion_top_k: 20,
        embeddings_backend: EmbeddingsBackend::Hash,
        embeddings_model_repo: None,
        embeddings_model_dir: None,
        embedding_batch_size: 2,
        hash_embedding_dim: 256,
        reranker_backend: RerankerBackend::Overlap,
        reranker_model: None,
        reranker_cache_size: 0,
        pair_score_band: 0.05,
        pair_min_doc_similarity: None,
        max_turns: 1,
        llm: LlmConfig {
            backend: LlmBackend::Gemini,
            model: "scripted".to_string(),
            api_key: None,
            temperature: 0.0,
            max_tokens: 256,
            timeout_ms: 5_000,
        },
        capability_timeout_ms: 5_000,
        retry_max_attempts: 1,
        retry_base_delay_ms: 0,
        parallel_workers: 2,
        eval_k: 10,
        intent_relevance_level: 3,
    }
}

/// The three-document prazo scenario
#[fixture]
pub fn scenario_corpus() -> Corpus {
    Corpus::from_documents(vec![
        Document::new("D1", "prazo recursal 15 dias"),
        Document::new("D2", "prazo recursal 30 dias"),
        Document::new("D3", "competência do tribunal"),
    ])
}

#[fixture]
pub fn scenario_query() -> Query {
    Query::new("Q1", "qual o prazo para recurso?")
        .with_intent("Quero saber se o prazo recursal é de 30 dias.")
}

#[fixture]
pub fn scenario_dataset(scenario_corpus: Corpus, scenario_query: Query) -> Dataset {
    Dataset {
        corpus: Arc::new(scenario_corpus),
        queries: Arc::new(vec![scenario_query]),
        qrels: Arc::new(Vec::new()),
    }
}

#[fixture]
pub fn overlap_reranker() -> Arc<dyn Reranker> {
    Arc::new(OverlapReranker::new(20))
}

/// Build state around the hash embedder and the given reranker
pub async fn app_state(
    config: Config,
    dataset: Dataset,
    reranker: Option<Arc<dyn Reranker>>,
) -> AppState {
    let dim = config.hash_embedding_dim;
    AppState::from_parts(config, dataset, Box::new(HashEmbedder::new(dim)), reranker)
        .await
        .unwrap()
}
