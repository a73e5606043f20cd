use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use juris_refine::cli::{Cli, Commands};
use juris_refine::config::Config;
use juris_refine::handlers::{
    handle_candidates, handle_chat, handle_evaluate, handle_intents, AppState,
};
use juris_refine::llm::create_language_model;

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = run().await {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env_with(&cli.path_overrides())?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %config.data_dir.display(),
        output_dir = %config.output_dir.display(),
        embeddings_backend = ?config.embeddings_backend,
        reranker_backend = ?config.reranker_backend,
        fusion = ?config.fusion_method,
        top_k = config.fusion_top_k,
        workers = config.parallel_workers,
        "Starting juris-refine"
    );

    let report = match &cli.command {
        Commands::Candidates(args) => {
            let state = AppState::init(config).await?;
            handle_candidates(&state, args).await?
        }
        Commands::Chat(args) => {
            let llm = create_language_model(&config.llm)?;
            let state = AppState::init(config).await?;
            handle_chat(&state, llm, args).await?
        }
        Commands::Intents(args) => {
            let llm = create_language_model(&config.llm)?;
            handle_intents(&config, llm, args).await?
        }
        Commands::Evaluate(args) => handle_evaluate(&config, args)?,
    };

    info!(
        queries = report.queries,
        notes = report.notes,
        files = ?report.files,
        "Done"
    );
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
