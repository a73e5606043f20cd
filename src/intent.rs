//! Search intent generation from highly relevant judged documents
//!
//! Runs are resumable: intents already present in the output file are kept,
//! and a daily quota error stops the run with progress saved.

use std::collections::HashMap;
use std::sync::Arc;

use crate::corpus::{Corpus, Document, Qrel, Query};
use crate::eval::match_key;
use crate::llm::json::{parse_reply, JsonReply};
use crate::llm::{api_error, LanguageModel};
use crate::retry::RetryPolicy;
use crate::storage::csv::IntentRow;

pub fn intent_prompt(query_text: &str, ideal_docs: &[&str]) -> String {
    let bullets = ideal_docs
        .iter()
        .map(|d| format!("- {d}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Você é um assistente jurídico em PT-BR.\n\
         A seguir está a pergunta original do usuário e os documentos julgados ideais para a busca da pergunta.\n\
         Pergunta: {query_text}\n\
         Documentos ideais:\n\
         {bullets}\n\n\
         Com base nisso, escreva a intenção de pergunta/busca do usuário de forma detalhada sem informar a exata lei ou artigo.\n\
         Retorne APENAS um JSON: \
         {{\"intent\": \"<intenção de busca em detalhes em PT-BR>\", \"rationale\": \"<por que esta é a intenção com base nos docs>\"}}"
    )
}

#[derive(Debug, Default)]
pub struct IntentRun {
    pub rows: Vec<IntentRow>,
    pub generated: usize,
    pub reused: usize,
    pub failed: usize,
    pub stopped_on_quota: bool,
}

pub struct IntentGenerator {
    llm: Arc<dyn LanguageModel>,
    policy: RetryPolicy,
    relevance_level: i32,
}

enum Outcome {
    Intent(JsonReply),
    Failed,
    QuotaExhausted,
}

impl IntentGenerator {
    pub fn new(llm: Arc<dyn LanguageModel>, policy: RetryPolicy, relevance_level: i32) -> Self {
        Self {
            llm,
            policy,
            relevance_level,
        }
    }

    /// Statements of documents judged at the configured level, by judged rank
    pub fn ideal_documents<'a>(&self, query_id: &str, qrels: &[Qrel], corpus: &'a Corpus) -> Vec<&'a str> {
        let mut judged: Vec<&Qrel> = qrels
            .iter()
            .filter(|q| q.query_id == query_id && q.score == self.relevance_level)
            .collect();
        judged.sort_by_key(|q| q.rank.unwrap_or(u32::MAX));
        judged
            .into_iter()
            .filter_map(|q| corpus.get(&q.doc_id).or_else(|| find_by_key(corpus, &q.doc_id)))
            .map(|d| d.text.as_str())
            .collect()
    }

    /// Produce one row per query. Only the first `limit` queries (0 = all)
    /// lacking an intent are sent to the model.
    pub async fn run(
        &self,
        queries: &[Query],
        qrels: &[Qrel],
        corpus: &Corpus,
        existing: &HashMap<String, String>,
        limit: usize,
    ) -> IntentRun {
        let mut run = IntentRun::default();
        let mut attempted = 0usize;

        for query in queries {
            let known = existing
                .get(&query.id)
                .map(|s| s.trim())
                .filter(|s| !s.is_empty());
            let intent = if let Some(known) = known {
                run.reused += 1;
                known.to_string()
            } else if run.stopped_on_quota || (limit > 0 && attempted >= limit) {
                String::new()
            } else {
                attempted += 1;
                let docs = self.ideal_documents(&query.id, qrels, corpus);
                match self.generate(query, &docs).await {
                    Outcome::Intent(reply) => {
                        run.generated += 1;
                        reply.value
                    }
                    Outcome::Failed => {
                        run.failed += 1;
                        String::new()
                    }
                    Outcome::QuotaExhausted => {
                        tracing::warn!(query_id = %query.id, "Daily quota reached; saving progress and stopping");
                        run.stopped_on_quota = true;
                        String::new()
                    }
                }
            };

            run.rows.push(IntentRow {
                id: query.id.clone(),
                text: query.text.clone(),
                intencao: intent,
            });
        }

        run
    }

    async fn generate(&self, query: &Query, docs: &[&str]) -> Outcome {
        if docs.is_empty() {
            tracing::warn!(query_id = %query.id, level = self.relevance_level, "No judged documents at relevance level");
        }
        let prompt = intent_prompt(&query.text, docs);
        let prompt = prompt.as_str();
        let llm = self.llm.as_ref();

        let result = self
            .policy
            .run("generate_intent", || async move {
                let raw = llm.generate(prompt).await?;
                Ok(parse_reply(&raw, "intent")?)
            })
            .await;

        match result {
            Ok(reply) => Outcome::Intent(reply),
            Err(err) if api_error(&err.last_error).is_some_and(|api| api.is_daily_quota()) => {
                Outcome::QuotaExhausted
            }
            Err(err) => {
                tracing::warn!(query_id = %query.id, error = %err, "Intent generation failed");
                Outcome::Failed
            }
        }
    }
}

/// Judgements may cite `PREFIX-123` where the corpus has `123`, or the reverse
fn find_by_key<'a>(corpus: &'a Corpus, doc_id: &str) -> Option<&'a Document> {
    let key = match_key(doc_id);
    corpus.documents().iter().find(|d| match_key(&d.id) == key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ApiError;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedModel {
        replies: Mutex<Vec<Result<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies.lock().unwrap().remove(0)
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn corpus() -> Corpus {
        Corpus::from_documents(vec![
            Document::new("10", "prazo recursal 15 dias"),
            Document::new("11", "prazo recursal 30 dias"),
        ])
    }

    fn qrels() -> Vec<Qrel> {
        vec![
            Qrel { query_id: "1".into(), doc_id: "11".into(), score: 3, rank: Some(2) },
            Qrel { query_id: "1".into(), doc_id: "10".into(), score: 3, rank: Some(1) },
            Qrel { query_id: "2".into(), doc_id: "10".into(), score: 1, rank: Some(1) },
        ]
    }

    fn queries() -> Vec<Query> {
        vec![
            Query::new("1", "qual o prazo?"),
            Query::new("2", "quem julga?"),
            Query::new("3", "outra"),
        ]
    }

    #[test]
    fn ideal_documents_follow_judged_rank() {
        let generator = IntentGenerator::new(ScriptedModel::new(vec![]), RetryPolicy::immediate(), 3);
        let corpus = corpus();
        assert_eq!(
            generator.ideal_documents("1", &qrels(), &corpus),
            vec!["prazo recursal 15 dias", "prazo recursal 30 dias"]
        );
        assert!(generator.ideal_documents("2", &qrels(), &corpus).is_empty());
    }

    #[test]
    fn ideal_documents_match_prefixed_judgements() {
        let generator = IntentGenerator::new(ScriptedModel::new(vec![]), RetryPolicy::immediate(), 3);
        let judged = vec![Qrel {
            query_id: "1".into(),
            doc_id: "JURISPRUDENCIA-SELECIONADA-11".into(),
            score: 3,
            rank: None,
        }];
        assert_eq!(
            generator.ideal_documents("1", &judged, &corpus()),
            vec!["prazo recursal 30 dias"]
        );
    }

    #[tokio::test]
    async fn reuses_existing_and_generates_the_rest() {
        let model = ScriptedModel::new(vec![
            Ok(r#"{"intent":"Prazo para recorrer","rationale":"docs"}"#.to_string()),
            Ok("```json\n{\"intent\":\"Outra intenção\"}\n```".to_string()),
        ]);
        let generator = IntentGenerator::new(model.clone(), RetryPolicy::immediate(), 3);
        let existing = HashMap::from([("2".to_string(), "Já conhecida".to_string())]);

        let run = generator.run(&queries(), &qrels(), &corpus(), &existing, 0).await;

        assert_eq!(run.generated, 2);
        assert_eq!(run.reused, 1);
        let intents: Vec<&str> = run.rows.iter().map(|r| r.intencao.as_str()).collect();
        assert_eq!(intents, vec!["Prazo para recorrer", "Já conhecida", "Outra intenção"]);
        assert!(model.prompts.lock().unwrap()[0].contains("- prazo recursal 15 dias"));
    }

    #[tokio::test]
    async fn daily_quota_stops_the_run() {
        let quota = ApiError {
            provider: "Gemini",
            status: 429,
            body: "GenerateRequestsPerDayPerProjectPerModel".to_string(),
        };
        let model = ScriptedModel::new(vec![Err(quota.into())]);
        let generator = IntentGenerator::new(model.clone(), RetryPolicy::immediate(), 3);

        let run = generator.run(&queries(), &qrels(), &corpus(), &HashMap::new(), 0).await;

        assert!(run.stopped_on_quota);
        assert_eq!(run.rows.len(), 3);
        assert!(run.rows.iter().all(|r| r.intencao.is_empty()));
        assert_eq!(model.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn limit_bounds_model_calls() {
        let model = ScriptedModel::new(vec![Ok(r#"{"intent":"a"}"#.to_string())]);
        let generator = IntentGenerator::new(model.clone(), RetryPolicy::immediate(), 3);

        let run = generator.run(&queries(), &qrels(), &corpus(), &HashMap::new(), 1).await;

        assert_eq!(run.generated, 1);
        assert_eq!(run.rows[1].intencao, "");
        assert_eq!(model.prompts.lock().unwrap().len(), 1);
    }
}
