//! Applying reranker scores to a candidate list

use crate::corpus::Corpus;
use crate::error::RefineError;
use crate::reranker::{RerankDocument, Reranker};
use crate::retrieval::fusion::{assign_ranks, by_score_then_id, Candidate};
use crate::retry::RetryPolicy;

/// Text the reranker scores documents against. Conversation context extends
/// the query: `context ⊕ query` when present.
pub fn scoring_query(query: &str, context: Option<&str>) -> String {
    match context.map(str::trim).filter(|c| !c.is_empty()) {
        Some(context) => format!("{context}\n\n{query}"),
        None => query.to_string(),
    }
}

/// Prepare reranker input for candidates, in candidate order
pub fn prepare_rerank_docs(
    corpus: &Corpus,
    candidates: &[Candidate],
) -> Result<Vec<RerankDocument>, RefineError> {
    candidates
        .iter()
        .map(|candidate| {
            let doc = corpus
                .get(&candidate.doc_id)
                .ok_or_else(|| RefineError::RerankUnavailable {
                    attempts: 0,
                    reason: format!("candidate {} is not in the corpus", candidate.doc_id),
                })?;
            Ok(RerankDocument {
                id: doc.id.clone(),
                text: doc.text.clone(),
            })
        })
        .collect()
}

/// Set `rerank_score` on each candidate and re-sort. The set of candidates
/// is unchanged; ranks are reassigned `1..=n`.
pub fn apply_reranker_scores(candidates: &[Candidate], scores: &[f32]) -> Vec<Candidate> {
    let mut result = candidates.to_vec();
    for (candidate, score) in result.iter_mut().zip(scores) {
        candidate.rerank_score = Some(*score);
    }

    result.sort_by(|a, b| {
        by_score_then_id(a.current_score(), b.current_score(), &a.doc_id, &b.doc_id)
    });
    assign_ranks(&mut result);
    result
}

/// Score the first `reranker.top_k()` candidates against `query` (extended by
/// `context`) and re-sort them; the rest follow in their incoming order. On
/// failure the caller keeps its incoming order.
pub async fn rerank_candidates(
    reranker: &dyn Reranker,
    corpus: &Corpus,
    query: &str,
    context: Option<&str>,
    candidates: &[Candidate],
    policy: &RetryPolicy,
) -> Result<Vec<Candidate>, RefineError> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let limit = match reranker.top_k() {
        0 => candidates.len(),
        k => k.min(candidates.len()),
    };
    let (head, tail) = candidates.split_at(limit);

    let docs = prepare_rerank_docs(corpus, head)?;
    let text = scoring_query(query, context);
    let text = text.as_str();
    let docs = docs.as_slice();
    let expected = docs.len();

    let scores = policy
        .run("rerank", || async move {
            let scores = reranker.rerank(text, docs).await?;
            if scores.len() != expected {
                anyhow::bail!(
                    "reranker returned {} scores for {} documents",
                    scores.len(),
                    expected
                );
            }
            Ok(scores)
        })
        .await
        .map_err(|err| RefineError::RerankUnavailable {
            attempts: err.attempts,
            reason: format!("{:#}", err.last_error),
        })?;

    let mut reranked = apply_reranker_scores(head, &scores);
    reranked.extend(tail.iter().cloned());
    assign_ranks(&mut reranked);
    Ok(reranked)
}
