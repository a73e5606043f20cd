//! Answers to clarifying questions: synthetic (intent-conditioned) or supplied

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::corpus::Query;
use crate::error::RefineError;
use crate::llm::json::request_field;
use crate::llm::LanguageModel;
use crate::retry::RetryPolicy;

/// Reply used when the background does not cover the question
pub const UNKNOWN_ANSWER: &str = "não sei";

#[async_trait]
pub trait AnswerSource: Send + Sync {
    /// Answer `question`, asked as turn `turn` of `query`'s session
    async fn answer(&self, query: &Query, turn: usize, question: &str) -> Result<String, RefineError>;
}

pub fn answer_prompt(intent: &str, question: &str) -> String {
    format!(
        "Você receberá um BACKGROUND (descrição da necessidade de informação da busca) e uma PERGUNTA.\n\
         Responda EXCLUSIVAMENTE com base no BACKGROUND: cite apenas afirmações explícitas nele.\n\
         Se a resposta NÃO estiver coberta pelo BACKGROUND, responda exatamente '{UNKNOWN_ANSWER}'.\n\
         Não invente, não use conhecimento externo, não reinterprete.\n\n\
         BACKGROUND:\n{intent}\n\n\
         PERGUNTA:\n{question}\n\n\
         Retorne APENAS um JSON de uma linha com o seguinte formato: \
         {{\"answer\": \"<resposta direta em PT-BR baseada no BACKGROUND ou \\\"{UNKNOWN_ANSWER}\\\">\"}}.\n\
         Não inclua nada além do JSON."
    )
}

/// Simulated user who knows the query's intent
pub struct AutoAnswerer {
    llm: Arc<dyn LanguageModel>,
    policy: RetryPolicy,
}

impl AutoAnswerer {
    pub fn new(llm: Arc<dyn LanguageModel>, policy: RetryPolicy) -> Self {
        Self { llm, policy }
    }
}

#[async_trait]
impl AnswerSource for AutoAnswerer {
    async fn answer(&self, query: &Query, _turn: usize, question: &str) -> Result<String, RefineError> {
        let intent = query.intent_text().ok_or_else(|| RefineError::IntentMissing {
            query_id: query.id.clone(),
        })?;

        let prompt = answer_prompt(intent, question);
        let reply = request_field(self.llm.as_ref(), &self.policy, "auto_answer", &prompt, "answer").await?;
        Ok(reply.value)
    }
}

/// Answers supplied ahead of time, keyed by query id and turn index
pub struct FileAnswers {
    answers: HashMap<(String, usize), String>,
}

impl FileAnswers {
    pub fn new(answers: HashMap<(String, usize), String>) -> Self {
        Self { answers }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let answers = crate::storage::csv::load_answers(path)?;
        tracing::info!(path = %path.display(), answers = answers.len(), "Loaded external answers");
        Ok(Self::new(answers))
    }
}

#[async_trait]
impl AnswerSource for FileAnswers {
    async fn answer(&self, query: &Query, turn: usize, _question: &str) -> Result<String, RefineError> {
        self.answers
            .get(&(query.id.clone(), turn))
            .cloned()
            .ok_or_else(|| RefineError::AnswerMissing {
                query_id: query.id.clone(),
                turn,
            })
    }
}
