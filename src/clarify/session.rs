//! Per-query dialog state: turns, candidate snapshots and the question state machine

use std::collections::HashSet;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use super::ClarifyingMode;
use crate::retrieval::fusion::Candidate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    SelectDocPair,
    GenerateQuestion,
    Done,
}

/// Two candidates a `pairs` question contrasts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocPair {
    pub first: String,
    pub second: String,
    pub score_gap: f32,
}

impl DocPair {
    /// Order-independent identity
    pub fn key(&self) -> (String, String) {
        if self.first <= self.second {
            (self.first.clone(), self.second.clone())
        } else {
            (self.second.clone(), self.first.clone())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub index: usize,
    pub question: String,
    /// Empty until an answer source fills it
    pub answer: String,
    pub rationale: Option<String>,
    pub basis: Option<DocPair>,
}

impl ConversationTurn {
    pub fn is_answered(&self) -> bool {
        !self.answer.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClarifyingSession {
    pub query_id: String,
    pub mode: ClarifyingMode,
    state: SessionState,
    max_turns: usize,
    turns: Vec<ConversationTurn>,
    pub candidates_before: Vec<Candidate>,
    pub candidates_after: Vec<Candidate>,
    pub notes: Vec<String>,
}

impl ClarifyingSession {
    pub fn new(
        query_id: impl Into<String>,
        mode: ClarifyingMode,
        max_turns: usize,
        candidates_before: Vec<Candidate>,
    ) -> Self {
        Self {
            query_id: query_id.into(),
            mode,
            state: SessionState::Idle,
            max_turns,
            turns: Vec::new(),
            candidates_after: candidates_before.clone(),
            candidates_before,
            notes: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    pub fn has_turn_budget(&self) -> bool {
        self.turns.len() < self.max_turns
    }

    /// Answered turns, which are the ones that shaped the final ranking
    pub fn turns_used(&self) -> usize {
        self.turns.iter().filter(|t| t.is_answered()).count()
    }

    pub fn note(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(query_id = %self.query_id, note = %message, "Session note");
        self.notes.push(message);
    }

    /// Move the state machine, rejecting edges the mode does not have
    pub fn transition(&mut self, next: SessionState) -> Result<()> {
        use SessionState::*;
        let allowed = match (self.mode, self.state, next) {
            (_, Done, Idle) => true,
            (_, GenerateQuestion, Done) => true,
            (ClarifyingMode::Pairs, Idle, SelectDocPair) => true,
            (ClarifyingMode::Pairs, SelectDocPair, GenerateQuestion | Done) => true,
            (ClarifyingMode::NoPairs, Idle, GenerateQuestion) => true,
            _ => false,
        };
        if !allowed {
            bail!(
                "invalid {} session transition {:?} -> {:?}",
                self.mode.as_str(),
                self.state,
                next
            );
        }
        self.state = next;
        Ok(())
    }

    /// Append a new unanswered turn. Turns are never edited afterwards,
    /// except for filling the answer once.
    pub fn push_turn(
        &mut self,
        question: String,
        rationale: Option<String>,
        basis: Option<DocPair>,
    ) -> Result<&ConversationTurn> {
        if !self.has_turn_budget() {
            bail!("session {} already has {} turn(s)", self.query_id, self.max_turns);
        }
        if self.mode == ClarifyingMode::NoPairs && basis.is_some() {
            bail!("no_pairs turns cannot reference documents");
        }
        let index = self.turns.len();
        self.turns.push(ConversationTurn {
            index,
            question,
            answer: String::new(),
            rationale,
            basis,
        });
        Ok(&self.turns[index])
    }

    /// Fill the answer of the most recent turn
    pub fn answer_last(&mut self, answer: impl Into<String>) -> Result<()> {
        let Some(turn) = self.turns.last_mut() else {
            bail!("session {} has no turn to answer", self.query_id);
        };
        if turn.is_answered() {
            bail!("turn {} is already answered", turn.index);
        }
        turn.answer = answer.into();
        Ok(())
    }

    pub fn asked_pairs(&self) -> HashSet<(String, String)> {
        self.turns
            .iter()
            .filter_map(|t| t.basis.as_ref().map(DocPair::key))
            .collect()
    }

    /// Answered turns in order, as extra reranking context
    pub fn context(&self) -> Option<String> {
        let parts: Vec<String> = self
            .turns
            .iter()
            .filter(|t| t.is_answered())
            .map(|t| format!("Pergunta clarificadora: {}\nResposta: {}", t.question, t.answer))
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(mode: ClarifyingMode, max_turns: usize) -> ClarifyingSession {
        ClarifyingSession::new("1", mode, max_turns, Vec::new())
    }

    #[test]
    fn pairs_walks_its_states() {
        let mut s = session(ClarifyingMode::Pairs, 1);
        s.transition(SessionState::SelectDocPair).unwrap();
        s.transition(SessionState::GenerateQuestion).unwrap();
        s.transition(SessionState::Done).unwrap();
        s.transition(SessionState::Idle).unwrap();
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[test]
    fn no_pairs_never_selects_documents() {
        let mut s = session(ClarifyingMode::NoPairs, 1);
        assert!(s.transition(SessionState::SelectDocPair).is_err());
        s.transition(SessionState::GenerateQuestion).unwrap();
        s.transition(SessionState::Done).unwrap();

        let pair = DocPair {
            first: "D1".into(),
            second: "D2".into(),
            score_gap: 0.0,
        };
        assert!(s.push_turn("q".into(), None, Some(pair)).is_err());
    }

    #[test]
    fn turn_budget_is_enforced() {
        let mut s = session(ClarifyingMode::NoPairs, 1);
        s.push_turn("Qual prazo?".into(), None, None).unwrap();
        assert!(!s.has_turn_budget());
        assert!(s.push_turn("Outra?".into(), None, None).is_err());
        assert_eq!(s.turns().len(), 1);
    }

    #[test]
    fn answers_fill_once_and_build_context() {
        let mut s = session(ClarifyingMode::NoPairs, 2);
        assert!(s.context().is_none());
        s.push_turn("Qual prazo?".into(), None, None).unwrap();
        assert!(s.context().is_none());
        s.answer_last("30 dias").unwrap();
        assert!(s.answer_last("15 dias").is_err());
        assert_eq!(
            s.context().unwrap(),
            "Pergunta clarificadora: Qual prazo?\nResposta: 30 dias"
        );
        assert_eq!(s.turns_used(), 1);
    }

    #[test]
    fn pair_key_ignores_order() {
        let a = DocPair {
            first: "D2".into(),
            second: "D1".into(),
            score_gap: 0.0,
        };
        assert_eq!(a.key(), ("D1".to_string(), "D2".to_string()));
    }
}
