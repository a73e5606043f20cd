//! Command-line surface

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::clarify::ClarifyingMode;
use crate::config::PathOverrides;

#[derive(Parser, Debug)]
#[command(
    name = "juris-refine",
    version,
    about = "Hybrid retrieval, reranking and clarifying-question refinement for legal documents"
)]
pub struct Cli {
    /// Directory holding doc.csv, query.csv, qrel.csv and query_intencao.csv (env: DATA_DIR)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Where candidate, session and metrics files are written (env: OUTPUT_DIR)
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn path_overrides(&self) -> PathOverrides {
        PathOverrides {
            data_dir: self.data_dir.clone(),
            output_dir: self.output_dir.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fuse lexical and semantic scores, rerank, write candidates_top{K}.csv
    Candidates(CandidatesArgs),
    /// Run clarifying-question sessions and rerank with the conversation
    Chat(ChatArgs),
    /// Generate search intents from highly relevant judged documents
    Intents(IntentsArgs),
    /// Score a candidate file against qrel.csv
    Evaluate(EvaluateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CandidatesArgs {
    /// Number of queries to process (0 = all)
    #[arg(long, default_value_t = 0)]
    pub n: usize,
}

#[derive(Args, Debug, Clone)]
pub struct ChatArgs {
    #[arg(long, value_enum)]
    pub mode: ClarifyingMode,

    /// Number of queries to process (0 = all)
    #[arg(long, default_value_t = 0)]
    pub n: usize,

    /// CSV with QUERY_ID, TURN, ANSWER; replaces the intent-conditioned answerer
    #[arg(long)]
    pub answers: Option<PathBuf>,

    /// Overrides MAX_TURNS
    #[arg(long)]
    pub max_turns: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct IntentsArgs {
    /// Number of queries sent to the model in this run (0 = all missing)
    #[arg(long, default_value_t = 0)]
    pub n: usize,
}

#[derive(Args, Debug, Clone)]
pub struct EvaluateArgs {
    /// Candidate file to score; relative paths are looked up in the output dir
    #[arg(long)]
    pub candidates: PathBuf,

    /// Cutoff (overrides EVAL_K)
    #[arg(long)]
    pub k: Option<usize>,
}
