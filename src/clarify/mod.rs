//! Clarifying question generation in two modes
//!
//! `pairs` contrasts two near-tied candidates; `no_pairs` works from the
//! conversation alone. Each call runs one question cycle of the session
//! state machine and appends at most one unanswered turn.

pub mod pairs;
pub mod prompt;
pub mod session;

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::corpus::{Corpus, Query};
use crate::llm::json::request_field;
use crate::llm::LanguageModel;
use crate::retrieval::semantic::EmbeddingCache;
use crate::retry::RetryPolicy;

pub use pairs::PairCriteria;
pub use session::{ClarifyingSession, ConversationTurn, DocPair, SessionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ClarifyingMode {
    #[value(name = "pairs")]
    Pairs,
    #[value(name = "no_pairs")]
    NoPairs,
}

impl ClarifyingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pairs => "pairs",
            Self::NoPairs => "no_pairs",
        }
    }
}

pub struct ClarifyingEngine {
    llm: Arc<dyn LanguageModel>,
    policy: RetryPolicy,
    criteria: PairCriteria,
    embeddings: Option<Arc<EmbeddingCache>>,
}

impl ClarifyingEngine {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        policy: RetryPolicy,
        criteria: PairCriteria,
        embeddings: Option<Arc<EmbeddingCache>>,
    ) -> Self {
        Self {
            llm,
            policy,
            criteria,
            embeddings,
        }
    }

    /// Run one question cycle, ending in `Done`. Returns `true` when a turn
    /// was appended. LLM failures surface as `RefineError` in the chain.
    pub async fn generate(
        &self,
        session: &mut ClarifyingSession,
        query: &Query,
        corpus: &Corpus,
    ) -> Result<bool> {
        if session.state() == SessionState::Done {
            session.transition(SessionState::Idle)?;
        }
        if !session.has_turn_budget() {
            return Ok(false);
        }

        let conversation = prompt::conversation_text(&query.text, session.turns());

        let (prompt_text, basis) = match session.mode {
            ClarifyingMode::Pairs => {
                session.transition(SessionState::SelectDocPair)?;
                let pair = pairs::select_pair(
                    &session.candidates_after,
                    &self.criteria,
                    &session.asked_pairs(),
                    self.embeddings.as_deref(),
                );
                let Some(pair) = pair else {
                    session.note("no_pair: no near-tied candidates to contrast");
                    session.transition(SessionState::Done)?;
                    return Ok(false);
                };
                let text_of = |id: &str| corpus.get(id).map(|d| d.text.as_str()).unwrap_or("");
                let prompt_text =
                    prompt::pairs_prompt(&conversation, text_of(&pair.first), text_of(&pair.second));
                (prompt_text, Some(pair))
            }
            ClarifyingMode::NoPairs => (prompt::no_pairs_prompt(&conversation), None),
        };

        session.transition(SessionState::GenerateQuestion)?;
        let reply = request_field(
            self.llm.as_ref(),
            &self.policy,
            "clarifying_question",
            &prompt_text,
            "question",
        )
        .await;

        let reply = match reply {
            Ok(reply) => reply,
            Err(err) => {
                session.transition(SessionState::Done)?;
                return Err(err.into());
            }
        };

        tracing::debug!(
            query_id = %query.id,
            mode = session.mode.as_str(),
            question = %reply.value,
            "Generated clarifying question"
        );
        session.push_turn(reply.value, reply.rationale, basis)?;
        session.transition(SessionState::Done)?;
        Ok(true)
    }
}
