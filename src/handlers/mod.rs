//! Command handlers

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::answer::{AnswerSource, AutoAnswerer, FileAnswers};
use crate::cli::{CandidatesArgs, ChatArgs, EvaluateArgs, IntentsArgs};
use crate::clarify::ClarifyingEngine;
use crate::config::Config;
use crate::conversation::ConversationLoop;
use crate::corpus::Qrel;
use crate::eval::{evaluate, MetricsRow};
use crate::intent::IntentGenerator;
use crate::llm::LanguageModel;
use crate::storage::csv::{
    load_intents, load_ranked_rows, write_rows, CandidateRow, ChatCandidateRow, RankedRow,
};
use crate::storage::sessions::write_sessions;

pub use state::{load_optional_qrels, AppState, Dataset};

mod state;

/// What a command did, for the final log line
#[derive(Debug, Clone, Default)]
pub struct CommandReport {
    pub queries: usize,
    pub notes: usize,
    pub files: Vec<PathBuf>,
}

/// `candidates`: fused + reranked top-K per query
pub async fn handle_candidates(state: &AppState, args: &CandidatesArgs) -> Result<CommandReport> {
    let config = &state.config;
    let queries = state.dataset.first_queries(args.n);
    tracing::info!(queries = queries.len(), "Ranking candidates");

    let passes = state
        .pipeline
        .run_batch(queries, config.parallel_workers)
        .await;

    let mut report = CommandReport {
        queries: passes.len(),
        ..Default::default()
    };
    let mut rows = Vec::new();
    for pass in &passes {
        for note in &pass.notes {
            tracing::warn!(query_id = %pass.query_id, note = %note, "Query degraded");
        }
        report.notes += pass.notes.len();
        rows.extend(pass.candidates.iter().map(CandidateRow::from));
    }

    let path = config
        .output_dir
        .join(format!("candidates_top{}.csv", config.fusion_top_k));
    write_rows(&path, &rows)?;
    tracing::info!(path = %path.display(), rows = rows.len(), "Wrote candidates");
    report.files.push(path);

    let ranked: Vec<RankedRow> = rows
        .iter()
        .map(|r| ranked_row(&r.query_id, &r.doc_id, r.rank))
        .collect();
    if let Some(path) = write_metrics(config, "candidates", &ranked, &state.dataset.qrels, config.eval_k)? {
        report.files.push(path);
    }
    Ok(report)
}

/// `chat`: clarifying sessions in one mode, reranked with the conversation
pub async fn handle_chat(
    state: &AppState,
    llm: Arc<dyn LanguageModel>,
    args: &ChatArgs,
) -> Result<CommandReport> {
    let config = &state.config;
    let policy = config.retry_policy();
    let max_turns = args.max_turns.unwrap_or(config.max_turns);

    let answers: Arc<dyn AnswerSource> = match &args.answers {
        Some(path) => Arc::new(FileAnswers::load(path)?),
        None => Arc::new(AutoAnswerer::new(llm.clone(), policy.clone())),
    };

    let engine = ClarifyingEngine::new(
        llm,
        policy,
        config.pair_criteria(),
        Some(state.pipeline.retriever().semantic().cache().clone()),
    );
    let conversation =
        ConversationLoop::new(state.pipeline.clone(), engine, answers, args.mode, max_turns);

    let queries = state.dataset.first_queries(args.n);
    tracing::info!(
        queries = queries.len(),
        mode = args.mode.as_str(),
        max_turns,
        "Starting clarifying sessions"
    );
    let sessions = conversation
        .run_batch(queries, config.parallel_workers)
        .await;

    let mode = args.mode.as_str();
    let mut report = CommandReport {
        queries: sessions.len(),
        ..Default::default()
    };
    let mut rows = Vec::new();
    for session in &sessions {
        report.notes += session.notes.len();
        let turns_used = session.turns_used();
        rows.extend(
            session
                .candidates_after
                .iter()
                .map(|c| ChatCandidateRow::new(c, turns_used)),
        );
    }

    let path = config
        .output_dir
        .join(format!("candidates_chat_{mode}_top{}.csv", config.fusion_top_k));
    write_rows(&path, &rows)?;
    tracing::info!(path = %path.display(), rows = rows.len(), "Wrote chat candidates");
    report.files.push(path);

    let path = config.output_dir.join(format!("sessions_{mode}.jsonl"));
    write_sessions(&path, &sessions)?;
    tracing::info!(path = %path.display(), sessions = sessions.len(), "Wrote sessions");
    report.files.push(path);

    let ranked: Vec<RankedRow> = rows
        .iter()
        .map(|r| ranked_row(&r.query_id, &r.doc_id, r.rank))
        .collect();
    let name = format!("chat_{mode}");
    if let Some(path) = write_metrics(config, &name, &ranked, &state.dataset.qrels, config.eval_k)? {
        report.files.push(path);
    }
    Ok(report)
}

/// `intents`: fill `query_intencao.csv`, resuming from earlier runs
pub async fn handle_intents(
    config: &Config,
    llm: Arc<dyn LanguageModel>,
    args: &IntentsArgs,
) -> Result<CommandReport> {
    let dataset = Dataset::load(config)?;
    if dataset.qrels.is_empty() {
        return Err(anyhow!(
            "Intent generation needs judgements: {} is missing or empty",
            config.qrel_csv.display()
        ));
    }

    let output = config.output_dir.join("query_intencao.csv");
    let existing = if output.exists() {
        load_intents(&output)?
    } else if config.intent_csv.exists() {
        load_intents(&config.intent_csv)?
    } else {
        Default::default()
    };

    let generator = IntentGenerator::new(llm, config.retry_policy(), config.intent_relevance_level);
    let run = generator
        .run(&dataset.queries, &dataset.qrels, &dataset.corpus, &existing, args.n)
        .await;

    write_rows(&output, &run.rows)?;
    tracing::info!(
        path = %output.display(),
        generated = run.generated,
        reused = run.reused,
        failed = run.failed,
        stopped_on_quota = run.stopped_on_quota,
        "Wrote intents"
    );

    Ok(CommandReport {
        queries: run.rows.len(),
        notes: run.failed,
        files: vec![output],
    })
}

/// `evaluate`: metrics for an existing candidate file
pub fn handle_evaluate(config: &Config, args: &EvaluateArgs) -> Result<CommandReport> {
    let path = config.resolve_output_path(&args.candidates);
    let qrels = load_optional_qrels(&config.qrel_csv)?;
    if qrels.is_empty() {
        return Err(anyhow!(
            "Evaluation needs judgements: {} is missing or empty",
            config.qrel_csv.display()
        ));
    }

    let ranked = load_ranked_rows(&path)
        .with_context(|| format!("Failed to load candidates from {}", path.display()))?;
    let k = args.k.unwrap_or(config.eval_k);
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "candidates".to_string());

    let mut report = CommandReport::default();
    if let Some(out) = write_metrics(config, &name, &ranked.records, &qrels, k)? {
        report.files.push(out);
    }
    report.queries = ranked
        .records
        .iter()
        .map(|r| r.query_id.as_str())
        .collect::<std::collections::HashSet<_>>()
        .len();
    Ok(report)
}

fn ranked_row(query_id: &str, doc_id: &str, rank: usize) -> RankedRow {
    RankedRow {
        query_id: query_id.to_string(),
        doc_id: doc_id.to_string(),
        rank,
    }
}

/// Write `metrics_{name}_top{k}.csv` when there are judgements to score against
fn write_metrics(
    config: &Config,
    name: &str,
    ranked: &[RankedRow],
    qrels: &[Qrel],
    k: usize,
) -> Result<Option<PathBuf>> {
    if qrels.is_empty() {
        return Ok(None);
    }
    let rows = evaluate(ranked, qrels, k);
    if rows.is_empty() {
        tracing::warn!(name, "No ranked query has relevant judgements; metrics skipped");
        return Ok(None);
    }

    let path = metrics_path(&config.output_dir, name, k);
    write_rows(&path, &rows)?;
    if let Some(mean) = rows.last() {
        log_mean(name, mean);
    }
    Ok(Some(path))
}

fn metrics_path(output_dir: &Path, name: &str, k: usize) -> PathBuf {
    output_dir.join(format!("metrics_{name}_top{k}.csv"))
}

fn log_mean(name: &str, mean: &MetricsRow) {
    tracing::info!(
        name,
        k = mean.k,
        precision = mean.precision,
        recall = mean.recall,
        ndcg = mean.ndcg,
        mrr = mean.mrr,
        "Mean metrics"
    );
}
