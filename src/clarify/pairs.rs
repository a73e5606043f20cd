//! Near-tie document pair selection for `pairs` questions

use std::collections::HashSet;

use super::session::DocPair;
use crate::retrieval::fusion::Candidate;
use crate::retrieval::semantic::EmbeddingCache;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairCriteria {
    /// Maximum score difference for two candidates to count as near-tied
    pub score_band: f32,
    /// Optional minimum cosine between the two documents' embeddings
    pub min_doc_similarity: Option<f32>,
}

impl Default for PairCriteria {
    fn default() -> Self {
        Self {
            score_band: 0.05,
            min_doc_similarity: None,
        }
    }
}

/// Highest-ranked near-tied pair not asked about yet. Pairs are visited in
/// rank order: (1,2), (1,3), ..., (2,3), ...
pub fn select_pair(
    candidates: &[Candidate],
    criteria: &PairCriteria,
    asked: &HashSet<(String, String)>,
    embeddings: Option<&EmbeddingCache>,
) -> Option<DocPair> {
    let mut ranked: Vec<&Candidate> = candidates.iter().collect();
    ranked.sort_by_key(|c| c.rank);

    for (i, a) in ranked.iter().enumerate() {
        for b in &ranked[i + 1..] {
            let gap = (a.current_score() - b.current_score()).abs();
            if gap > criteria.score_band {
                continue;
            }

            let pair = DocPair {
                first: a.doc_id.clone(),
                second: b.doc_id.clone(),
                score_gap: gap,
            };
            if asked.contains(&pair.key()) {
                continue;
            }

            if let (Some(threshold), Some(cache)) = (criteria.min_doc_similarity, embeddings) {
                match cache.similarity(&a.doc_id, &b.doc_id) {
                    Some(sim) if sim >= threshold => {}
                    _ => continue,
                }
            }

            return Some(pair);
        }
    }
    None
}
