//! Per-query refinement: fuse, rerank, ask, answer, rerank again
//!
//! Every per-query failure is recorded on the session and logged; none of
//! them stop the batch. A query's result is only handed back once all of its
//! stages have finished.

use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::answer::AnswerSource;
use crate::clarify::{ClarifyingEngine, ClarifyingMode, ClarifyingSession};
use crate::corpus::Query;
use crate::error::RefineError;
use crate::reranker::Reranker;
use crate::retrieval::fusion::Candidate;
use crate::retrieval::rerank::rerank_candidates;
use crate::retrieval::Retriever;
use crate::retry::RetryPolicy;

/// Ranked candidates for one query after fusion and the first rerank pass
#[derive(Debug, Clone)]
pub struct FirstPass {
    pub query_id: String,
    pub fused: Vec<Candidate>,
    pub candidates: Vec<Candidate>,
    pub notes: Vec<String>,
}

/// Fusion plus context-free reranking
#[derive(Clone)]
pub struct CandidatePipeline {
    retriever: Retriever,
    reranker: Option<Arc<dyn Reranker>>,
    policy: RetryPolicy,
}

impl CandidatePipeline {
    pub fn new(retriever: Retriever, reranker: Option<Arc<dyn Reranker>>, policy: RetryPolicy) -> Self {
        Self {
            retriever,
            reranker,
            policy,
        }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub async fn first_pass(&self, query: &Query) -> FirstPass {
        let retrieval = self.retriever.retrieve(query).await;
        let fused = retrieval.ranking.to_vec();
        let mut notes = retrieval.notes;

        let candidates = match self.rerank(query, None, &fused).await {
            Ok(Some(reranked)) => reranked,
            Ok(None) => fused.clone(),
            Err(err) => {
                tracing::warn!(query_id = %query.id, error = %err, "Rerank failed; keeping fused order");
                notes.push(note(&err));
                fused.clone()
            }
        };

        FirstPass {
            query_id: query.id.clone(),
            fused,
            candidates,
            notes,
        }
    }

    /// `Ok(None)` when no reranker is configured
    pub async fn rerank(
        &self,
        query: &Query,
        context: Option<&str>,
        candidates: &[Candidate],
    ) -> Result<Option<Vec<Candidate>>, RefineError> {
        let Some(reranker) = &self.reranker else {
            return Ok(None);
        };
        rerank_candidates(
            reranker.as_ref(),
            self.retriever.corpus(),
            &query.text,
            context,
            candidates,
            &self.policy,
        )
        .await
        .map(Some)
    }

    /// First pass for every query, in input order
    pub async fn run_batch(&self, queries: &[Query], workers: usize) -> Vec<FirstPass> {
        stream::iter(queries)
            .map(|query| self.first_pass(query))
            .buffered(workers.max(1))
            .collect()
            .await
    }
}

pub struct ConversationLoop {
    pipeline: CandidatePipeline,
    engine: ClarifyingEngine,
    answers: Arc<dyn AnswerSource>,
    mode: ClarifyingMode,
    max_turns: usize,
}

impl ConversationLoop {
    pub fn new(
        pipeline: CandidatePipeline,
        engine: ClarifyingEngine,
        answers: Arc<dyn AnswerSource>,
        mode: ClarifyingMode,
        max_turns: usize,
    ) -> Self {
        Self {
            pipeline,
            engine,
            answers,
            mode,
            max_turns,
        }
    }

    pub fn mode(&self) -> ClarifyingMode {
        self.mode
    }

    pub async fn run_query(&self, query: &Query) -> ClarifyingSession {
        let first = self.pipeline.first_pass(query).await;
        let mut session =
            ClarifyingSession::new(&query.id, self.mode, self.max_turns, first.candidates);
        session.notes.extend(first.notes);

        let corpus = self.pipeline.retriever().corpus().clone();

        while session.has_turn_budget() {
            match self.engine.generate(&mut session, query, &corpus).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => {
                    let kind = err
                        .downcast_ref::<RefineError>()
                        .map(RefineError::kind)
                        .unwrap_or("question_failed");
                    tracing::warn!(query_id = %query.id, error = %format!("{err:#}"), "Clarifying question failed");
                    session.note(format!("{kind}: {err:#}"));
                    break;
                }
            }

            let Some(turn) = session.turns().last() else {
                break;
            };
            let (index, question) = (turn.index, turn.question.clone());

            let answer = match self.answers.answer(query, index, &question).await {
                Ok(answer) => answer,
                Err(err) => {
                    tracing::warn!(query_id = %query.id, turn = index, error = %err, "No answer; session stays answer-less");
                    session.note(note(&err));
                    break;
                }
            };
            if let Err(err) = session.answer_last(answer) {
                session.note(format!("answer_rejected: {err}"));
                break;
            }

            let context = session.context();
            match self
                .pipeline
                .rerank(query, context.as_deref(), &session.candidates_after)
                .await
            {
                Ok(Some(reranked)) => session.candidates_after = reranked,
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(query_id = %query.id, turn = index, error = %err, "Context rerank failed; keeping previous order");
                    session.note(note(&err));
                }
            }
        }

        tracing::info!(
            query_id = %query.id,
            mode = self.mode.as_str(),
            turns = session.turns().len(),
            notes = session.notes.len(),
            "Query refined"
        );
        session
    }

    /// Sessions for every query, in input order
    pub async fn run_batch(&self, queries: &[Query], workers: usize) -> Vec<ClarifyingSession> {
        stream::iter(queries)
            .map(|query| self.run_query(query))
            .buffered(workers.max(1))
            .collect()
            .await
    }
}

fn note(err: &RefineError) -> String {
    format!("{}: {}", err.kind(), err)
}
