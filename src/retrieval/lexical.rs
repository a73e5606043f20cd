//! Okapi BM25 over the analyzed lexical field of each document

use std::collections::HashMap;

use rayon::prelude::*;

use crate::corpus::Corpus;
use crate::text::analyze;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

struct DocTerms {
    id: String,
    len: f32,
    freqs: HashMap<String, u32>,
}

/// Immutable BM25 index built once per corpus load
pub struct LexicalIndex {
    params: Bm25Params,
    docs: Vec<DocTerms>,
    doc_freq: HashMap<String, u32>,
    avg_len: f32,
}

impl LexicalIndex {
    pub fn build(corpus: &Corpus, extra_fields: &[String], params: Bm25Params) -> Self {
        let docs: Vec<DocTerms> = corpus
            .documents()
            .par_iter()
            .map(|doc| {
                let tokens = analyze(&doc.lexical_text(extra_fields));
                let mut freqs = HashMap::new();
                for token in &tokens {
                    *freqs.entry(token.clone()).or_insert(0u32) += 1;
                }
                DocTerms {
                    id: doc.id.clone(),
                    len: tokens.len() as f32,
                    freqs,
                }
            })
            .collect();

        let mut doc_freq: HashMap<String, u32> = HashMap::new();
        for doc in &docs {
            for term in doc.freqs.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
        }

        let avg_len = if docs.is_empty() {
            0.0
        } else {
            docs.iter().map(|d| d.len).sum::<f32>() / docs.len() as f32
        };

        tracing::debug!(
            documents = docs.len(),
            terms = doc_freq.len(),
            avg_len,
            "Built lexical index"
        );

        Self {
            params,
            docs,
            doc_freq,
            avg_len,
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    fn idf(&self, term: &str) -> f32 {
        let n = self.docs.len() as f32;
        let df = self.doc_freq.get(term).copied().unwrap_or(0) as f32;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    /// Score every document against `query`. Scores are non-negative;
    /// documents sharing no term with the query score 0.
    pub fn score(&self, query: &str) -> HashMap<String, f32> {
        let terms = analyze(query);
        let Bm25Params { k1, b } = self.params;
        let avg_len = if self.avg_len > 0.0 { self.avg_len } else { 1.0 };

        let weighted: Vec<(&str, f32)> = terms
            .iter()
            .filter(|t| self.doc_freq.contains_key(t.as_str()))
            .map(|t| (t.as_str(), self.idf(t)))
            .collect();

        self.docs
            .iter()
            .map(|doc| {
                let norm = k1 * (1.0 - b + b * doc.len / avg_len);
                let score = weighted
                    .iter()
                    .filter_map(|(term, idf)| {
                        doc.freqs.get(*term).map(|&tf| {
                            let tf = tf as f32;
                            idf * tf * (k1 + 1.0) / (tf + norm)
                        })
                    })
                    .sum::<f32>();
                (doc.id.clone(), score)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Document;

    fn corpus() -> Corpus {
        Corpus::from_documents(vec![
            Document::new("D1", "prazo recursal 15 dias"),
            Document::new("D2", "prazo recursal 30 dias"),
            Document::new("D3", "competência do tribunal"),
        ])
    }

    #[test]
    fn matching_documents_outscore_unrelated_ones() {
        let index = LexicalIndex::build(&corpus(), &[], Bm25Params::default());
        let scores = index.score("qual o prazo para recurso?");

        assert_eq!(scores.len(), 3);
        assert!(scores["D1"] > 0.0);
        assert!((scores["D1"] - scores["D2"]).abs() < 1e-6);
        assert_eq!(scores["D3"], 0.0);
    }

    #[test]
    fn scores_are_non_negative_for_common_terms() {
        let docs = (0..5)
            .map(|i| Document::new(format!("D{i}"), "tribunal tribunal"))
            .collect();
        let index = LexicalIndex::build(&Corpus::from_documents(docs), &[], Bm25Params::default());
        assert!(index.score("tribunal").values().all(|s| *s >= 0.0));
    }

    #[test]
    fn extra_fields_are_indexed() {
        let corpus = Corpus::from_documents(vec![
            Document::new("D1", "enunciado").with_metadata("EXCERTO", "licitação"),
            Document::new("D2", "enunciado"),
        ]);
        let index = LexicalIndex::build(&corpus, &["EXCERTO".to_string()], Bm25Params::default());
        let scores = index.score("licitações");
        assert!(scores["D1"] > scores["D2"]);
    }

    #[test]
    fn empty_corpus_scores_nothing() {
        let index = LexicalIndex::build(&Corpus::default(), &[], Bm25Params::default());
        assert!(index.is_empty());
        assert!(index.score("prazo").is_empty());
    }
}
