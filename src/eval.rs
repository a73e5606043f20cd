//! Ranking metrics against graded relevance judgements

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::corpus::Qrel;
use crate::storage::csv::RankedRow;

/// Judged and ranked ids are compared on their trailing number when they
/// have one (`JURISPRUDENCIA-SELECIONADA-85434` matches `85434`).
pub fn match_key(doc_id: &str) -> String {
    let digits: String = doc_id
        .chars()
        .rev()
        .take_while(char::is_ascii_digit)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if digits.is_empty() {
        return doc_id.trim().to_string();
    }
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct MetricsRow {
    pub query_key: String,
    pub k: usize,
    pub precision: f64,
    pub recall: f64,
    pub ndcg: f64,
    pub mrr: f64,
}

/// Per-query metrics at `k` for every ranked query that has at least one
/// relevant judgement, followed by a `MEAN` row.
pub fn evaluate(ranked: &[RankedRow], qrels: &[Qrel], k: usize) -> Vec<MetricsRow> {
    let k = k.max(1);

    let mut grades: HashMap<&str, HashMap<String, i32>> = HashMap::new();
    for qrel in qrels {
        grades
            .entry(qrel.query_id.as_str())
            .or_default()
            .insert(match_key(&qrel.doc_id), qrel.score);
    }

    let mut by_query: BTreeMap<&str, Vec<&RankedRow>> = BTreeMap::new();
    for row in ranked {
        by_query.entry(row.query_id.as_str()).or_default().push(row);
    }

    let mut rows = Vec::new();
    for (query_id, mut results) in by_query {
        let Some(judged) = grades.get(query_id) else {
            tracing::debug!(query_id, "No judgements for ranked query; skipped");
            continue;
        };
        let relevant = judged.values().filter(|g| **g > 0).count();
        if relevant == 0 {
            continue;
        }

        results.sort_by_key(|r| r.rank);
        let gains: Vec<f64> = results
            .iter()
            .take(k)
            .map(|r| judged.get(&match_key(&r.doc_id)).copied().unwrap_or(0).max(0) as f64)
            .collect();

        let hits = gains.iter().filter(|g| **g > 0.0).count();
        let mrr = gains
            .iter()
            .position(|g| *g > 0.0)
            .map(|pos| 1.0 / (pos + 1) as f64)
            .unwrap_or(0.0);

        let mut ideal: Vec<f64> = judged.values().map(|g| (*g).max(0) as f64).collect();
        ideal.sort_by(|a, b| b.total_cmp(a));
        ideal.truncate(k);
        let idcg = dcg(&ideal);

        rows.push(MetricsRow {
            query_key: query_id.to_string(),
            k,
            precision: hits as f64 / k as f64,
            recall: hits as f64 / relevant as f64,
            ndcg: if idcg > 0.0 { dcg(&gains) / idcg } else { 0.0 },
            mrr,
        });
    }

    if !rows.is_empty() {
        let n = rows.len() as f64;
        let mean = |f: fn(&MetricsRow) -> f64| rows.iter().map(f).sum::<f64>() / n;
        let mean_row = MetricsRow {
            query_key: "MEAN".to_string(),
            k,
            precision: mean(|r| r.precision),
            recall: mean(|r| r.recall),
            ndcg: mean(|r| r.ndcg),
            mrr: mean(|r| r.mrr),
        };
        rows.push(mean_row);
    }
    rows
}

fn dcg(gains: &[f64]) -> f64 {
    gains
        .iter()
        .enumerate()
        .map(|(i, g)| g / ((i + 2) as f64).log2())
        .sum()
}
