//! Hybrid fusion of lexical and semantic scores into one ranked candidate list

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// One ranked document for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub query_id: String,
    pub doc_id: String,
    pub rank: usize,
    pub lexical_score: f32,
    pub semantic_score: f32,
    pub fused_score: f32,
    pub rerank_score: Option<f32>,
}

impl Candidate {
    /// Score the current order is based on
    pub fn current_score(&self) -> f32 {
        self.rerank_score.unwrap_or(self.fused_score)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMethod {
    /// Min-max normalize both signals over the union, then mix with alpha
    MinMax,
    /// Weighted reciprocal rank fusion
    Rrf,
}

impl FromStr for FusionMethod {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "minmax" | "min_max" | "linear" => Ok(Self::MinMax),
            "rrf" => Ok(Self::Rrf),
            other => Err(anyhow!("Unknown FUSION_METHOD: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FusionParams {
    pub method: FusionMethod,
    /// Weight of the lexical signal, in [0, 1]
    pub alpha: f32,
    /// Documents taken from each signal before merging
    pub candidate_pool: usize,
    pub top_k: usize,
    pub rrf_k: f32,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            method: FusionMethod::MinMax,
            alpha: 0.5,
            candidate_pool: 100,
            top_k: 20,
            rrf_k: 60.0,
        }
    }
}

/// Ordered top-K for one query. Iterating it does not consume it.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedRanking {
    query_id: String,
    candidates: Vec<Candidate>,
}

impl FusedRanking {
    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candidate> {
        self.candidates.iter()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn doc_ids(&self) -> Vec<&str> {
        self.candidates.iter().map(|c| c.doc_id.as_str()).collect()
    }

    pub fn to_vec(&self) -> Vec<Candidate> {
        self.candidates.clone()
    }
}

impl<'a> IntoIterator for &'a FusedRanking {
    type Item = &'a Candidate;
    type IntoIter = std::slice::Iter<'a, Candidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.iter()
    }
}

/// Merge both signals for `query_id` into a ranked top-K.
pub fn fuse(
    query_id: &str,
    lexical: &HashMap<String, f32>,
    semantic: &HashMap<String, f32>,
    params: &FusionParams,
) -> FusedRanking {
    let lex_top = top_ids(lexical, params.candidate_pool);
    let sem_top = top_ids(semantic, params.candidate_pool);

    let union: BTreeSet<&str> = lex_top.iter().chain(sem_top.iter()).copied().collect();
    let raw = |scores: &HashMap<String, f32>, id: &str| scores.get(id).copied().unwrap_or(0.0);

    let fused: HashMap<&str, f32> = match params.method {
        FusionMethod::MinMax => {
            let lex_norm = min_max(union.iter().map(|id| (*id, raw(lexical, id))));
            let sem_norm = min_max(union.iter().map(|id| (*id, raw(semantic, id))));
            union
                .iter()
                .map(|id| {
                    let score =
                        params.alpha * lex_norm[id] + (1.0 - params.alpha) * sem_norm[id];
                    (*id, score)
                })
                .collect()
        }
        FusionMethod::Rrf => {
            let lex_rank = rank_positions(&lex_top);
            let sem_rank = rank_positions(&sem_top);
            let contribution = |ranks: &HashMap<&str, usize>, id: &str, weight: f32| {
                ranks
                    .get(id)
                    .map(|rank| weight / (params.rrf_k + *rank as f32))
                    .unwrap_or(0.0)
            };
            union
                .iter()
                .map(|id| {
                    let score = contribution(&lex_rank, id, params.alpha)
                        + contribution(&sem_rank, id, 1.0 - params.alpha);
                    (*id, score)
                })
                .collect()
        }
    };

    let mut candidates: Vec<Candidate> = union
        .iter()
        .map(|id| Candidate {
            query_id: query_id.to_string(),
            doc_id: id.to_string(),
            rank: 0,
            lexical_score: raw(lexical, id),
            semantic_score: raw(semantic, id),
            fused_score: fused[id],
            rerank_score: None,
        })
        .collect();

    candidates.sort_by(|a, b| by_score_then_id(a.fused_score, b.fused_score, &a.doc_id, &b.doc_id));
    candidates.truncate(params.top_k);
    assign_ranks(&mut candidates);

    FusedRanking {
        query_id: query_id.to_string(),
        candidates,
    }
}

/// Descending score, ascending doc id
pub fn by_score_then_id(a_score: f32, b_score: f32, a_id: &str, b_id: &str) -> Ordering {
    b_score.total_cmp(&a_score).then_with(|| a_id.cmp(b_id))
}

pub fn assign_ranks(candidates: &mut [Candidate]) {
    for (i, candidate) in candidates.iter_mut().enumerate() {
        candidate.rank = i + 1;
    }
}

fn top_ids(scores: &HashMap<String, f32>, pool: usize) -> Vec<&str> {
    let mut entries: Vec<(&str, f32)> = scores.iter().map(|(id, s)| (id.as_str(), *s)).collect();
    entries.sort_by(|a, b| by_score_then_id(a.1, b.1, a.0, b.0));
    entries.truncate(pool);
    entries.into_iter().map(|(id, _)| id).collect()
}

fn rank_positions<'a>(ids: &[&'a str]) -> HashMap<&'a str, usize> {
    ids.iter().enumerate().map(|(i, id)| (*id, i + 1)).collect()
}

fn min_max<'a>(values: impl Iterator<Item = (&'a str, f32)>) -> HashMap<&'a str, f32> {
    let values: Vec<(&str, f32)> = values.collect();
    let min = values.iter().map(|(_, v)| *v).fold(f32::INFINITY, f32::min);
    let max = values.iter().map(|(_, v)| *v).fold(f32::NEG_INFINITY, f32::max);
    let span = max - min;

    values
        .into_iter()
        .map(|(id, v)| {
            let norm = if span > f32::EPSILON { (v - min) / span } else { 0.0 };
            (id, norm)
        })
        .collect()
}
