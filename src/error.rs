//! Typed failures surfaced by the refinement pipeline
//!
//! Per-query failures (`RerankUnavailable`, `IntentMissing`, `AnswerMissing`,
//! `LlmUnavailable`) are downgraded to session notes by the conversation loop.
//! Load-time failures (`EmbeddingFailure`) abort the batch.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RefineError {
    #[error("reranker unavailable after {attempts} attempt(s): {reason}")]
    RerankUnavailable { attempts: u32, reason: String },

    #[error("no intent available for query {query_id}")]
    IntentMissing { query_id: String },

    #[error("no answer supplied for query {query_id} turn {turn}")]
    AnswerMissing { query_id: String, turn: usize },

    #[error("corpus embeddings could not be computed: {reason}")]
    EmbeddingFailure { reason: String },

    #[error("malformed {kind} record at line {line}: {reason}")]
    MalformedRecord {
        kind: &'static str,
        line: u64,
        reason: String,
    },

    #[error("language model unavailable after {attempts} attempt(s): {reason}")]
    LlmUnavailable { attempts: u32, reason: String },

    #[error("language model response is missing '{field}': {content}")]
    InvalidResponse { field: &'static str, content: String },
}

impl RefineError {
    /// Short machine-readable tag used in session notes and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RerankUnavailable { .. } => "rerank_unavailable",
            Self::IntentMissing { .. } => "intent_missing",
            Self::AnswerMissing { .. } => "answer_missing",
            Self::EmbeddingFailure { .. } => "embedding_failure",
            Self::MalformedRecord { .. } => "malformed_record",
            Self::LlmUnavailable { .. } => "llm_unavailable",
            Self::InvalidResponse { .. } => "invalid_response",
        }
    }
}
