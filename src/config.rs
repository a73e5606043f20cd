use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::clarify::PairCriteria;
use crate::retrieval::fusion::{FusionMethod, FusionParams};
use crate::retrieval::lexical::Bm25Params;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingsBackend {
    FastEmbed,
    Hash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RerankerBackend {
    FastEmbed,
    Overlap,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    Gemini,
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub model: String,
    #[serde(skip_serializing, default)]
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_ms: u64,
}

/// Directory overrides coming from the command line. They take precedence
/// over `DATA_DIR` / `OUTPUT_DIR`.
#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub data_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub data_dir: PathBuf,
    pub doc_csv: PathBuf,
    pub query_csv: PathBuf,
    pub qrel_csv: PathBuf,
    pub intent_csv: PathBuf,
    pub output_dir: PathBuf,

    // Lexical
    pub lexical_extra_fields: Vec<String>,
    pub bm25_k1: f32,
    pub bm25_b: f32,

    // Fusion
    pub fusion_method: FusionMethod,
    pub hybrid_alpha: f32,
    pub candidate_pool: usize,
    pub rrf_k: f32,
    pub fusion_top_k: usize,

    // Embeddings
    pub embeddings_backend: EmbeddingsBackend,
    pub embeddings_model_repo: Option<String>,
    pub embeddings_model_dir: Option<PathBuf>,
    pub embedding_batch_size: usize,
    pub hash_embedding_dim: usize,

    // Reranker
    pub reranker_backend: RerankerBackend,
    pub reranker_model: Option<String>,
    pub reranker_cache_size: usize,

    // Clarifying questions
    pub pair_score_band: f32,
    pub pair_min_doc_similarity: Option<f32>,
    pub max_turns: usize,
    pub llm: LlmConfig,

    // Capability calls
    pub capability_timeout_ms: u64,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub parallel_workers: usize,

    // Evaluation and intents
    pub eval_k: usize,
    pub intent_relevance_level: i32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(&PathOverrides::default())
    }

    pub fn from_env_with(overrides: &PathOverrides) -> Result<Self> {
        let data_dir_raw = match &overrides.data_dir {
            Some(dir) => dir.to_string_lossy().into_owned(),
            None => optional_env("DATA_DIR").unwrap_or_else(|| "./data".to_string()),
        };
        let data_dir = canonicalize_dir(Path::new(&data_dir_raw))
            .with_context(|| format!("Invalid DATA_DIR: {data_dir_raw}"))?;

        let doc_csv = default_path(&data_dir, "DOC_CSV", "doc.csv")?;
        let query_csv = default_path(&data_dir, "QUERY_CSV", "query.csv")?;
        let qrel_csv = default_path(&data_dir, "QREL_CSV", "qrel.csv")?;
        let intent_csv = default_path(&data_dir, "INTENT_CSV", "query_intencao.csv")?;
        let output_dir = match &overrides.output_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => env::current_dir()
                .context("Failed to get current_dir")?
                .join(dir),
            None => default_path(&data_dir, "OUTPUT_DIR", "./output")?,
        };

        let lexical_extra_fields = parse_csv_or_default(
            optional_env("LEXICAL_EXTRA_FIELDS").as_deref(),
            &["EXCERTO"],
        );

        let bm25_k1 = optional_env("BM25_K1")
            .as_deref()
            .map(parse_any_f32)
            .transpose()?
            .unwrap_or(1.2);
        if bm25_k1 < 0.0 {
            return Err(anyhow!("BM25_K1 must be >= 0"));
        }

        let bm25_b = optional_env("BM25_B")
            .as_deref()
            .map(|v| parse_unit_f32("BM25_B", v))
            .transpose()?
            .unwrap_or(0.75);

        let fusion_method = optional_env("FUSION_METHOD")
            .as_deref()
            .map(str::parse::<FusionMethod>)
            .transpose()?
            .unwrap_or(FusionMethod::MinMax);

        let hybrid_alpha = optional_env("HYBRID_ALPHA")
            .as_deref()
            .map(|v| parse_unit_f32("HYBRID_ALPHA", v))
            .transpose()?
            .unwrap_or(0.5);

        let candidate_pool = optional_env("CANDIDATE_POOL")
            .as_deref()
            .map(parse_usize)
            .transpose()?
            .unwrap_or(100);

        let rrf_k = optional_env("RRF_K")
            .as_deref()
            .map(parse_any_f32)
            .transpose()?
            .unwrap_or(60.0);

        let fusion_top_k = optional_env("FUSION_TOP_K")
            .as_deref()
            .map(parse_usize)
            .transpose()?
            .unwrap_or(20);
        if fusion_top_k == 0 {
            return Err(anyhow!("FUSION_TOP_K must be > 0"));
        }

        let embeddings_backend = optional_env("EMBEDDINGS_BACKEND")
            .as_deref()
            .map(parse_embeddings_backend)
            .transpose()?
            .unwrap_or(EmbeddingsBackend::FastEmbed);

        let embeddings_model_dir = match embeddings_backend {
            EmbeddingsBackend::FastEmbed => Some(default_path(
                &data_dir,
                "EMBEDDINGS_MODEL_DIR",
                "./.juris/models",
            )?),
            EmbeddingsBackend::Hash => None,
        };

        let embeddings_model_repo = match embeddings_backend {
            EmbeddingsBackend::FastEmbed => Some(
                optional_env("EMBEDDINGS_MODEL_REPO")
                    .unwrap_or_else(|| crate::embeddings::fastembed::DEFAULT_MODEL.to_string()),
            ),
            EmbeddingsBackend::Hash => None,
        };

        let embedding_batch_size = optional_env("EMBEDDING_BATCH_SIZE")
            .as_deref()
            .map(parse_usize)
            .transpose()?
            .unwrap_or(32);

        let hash_embedding_dim = optional_env("HASH_EMBEDDING_DIM")
            .as_deref()
            .map(parse_usize)
            .transpose()?
            .unwrap_or(256);

        let reranker_backend = optional_env("RERANKER_BACKEND")
            .as_deref()
            .map(parse_reranker_backend)
            .transpose()?
            .unwrap_or(RerankerBackend::FastEmbed);

        let reranker_model = optional_env("RERANKER_MODEL");

        let reranker_cache_size = optional_env("RERANKER_CACHE_SIZE")
            .as_deref()
            .map(parse_usize)
            .transpose()?
            .unwrap_or(256);

        let pair_score_band = optional_env("PAIR_SCORE_BAND")
            .as_deref()
            .map(parse_any_f32)
            .transpose()?
            .unwrap_or(0.05);
        if pair_score_band < 0.0 {
            return Err(anyhow!("PAIR_SCORE_BAND must be >= 0"));
        }

        let pair_min_doc_similarity = optional_env("PAIR_MIN_DOC_SIMILARITY")
            .as_deref()
            .map(parse_any_f32)
            .transpose()?;
        if let Some(v) = pair_min_doc_similarity {
            if !(-1.0..=1.0).contains(&v) {
                return Err(anyhow!("PAIR_MIN_DOC_SIMILARITY must be in -1..=1"));
            }
        }

        let max_turns = optional_env("MAX_TURNS")
            .as_deref()
            .map(parse_usize)
            .transpose()?
            .unwrap_or(1);

        let capability_timeout_ms = optional_env("CAPABILITY_TIMEOUT_MS")
            .as_deref()
            .map(parse_u64)
            .transpose()?
            .unwrap_or(60_000);

        let retry_max_attempts = optional_env("RETRY_MAX_ATTEMPTS")
            .as_deref()
            .map(parse_u64)
            .transpose()?
            .unwrap_or(3)
            .clamp(1, u32::MAX as u64) as u32;

        let retry_base_delay_ms = optional_env("RETRY_BASE_DELAY_MS")
            .as_deref()
            .map(parse_u64)
            .transpose()?
            .unwrap_or(500);

        let parallel_workers = optional_env("PARALLEL_WORKERS")
            .as_deref()
            .map(parse_usize)
            .transpose()?
            .unwrap_or_else(num_cpus::get)
            .max(1);

        let eval_k = optional_env("EVAL_K")
            .as_deref()
            .map(parse_usize)
            .transpose()?
            .unwrap_or(10)
            .max(1);

        let intent_relevance_level = optional_env("INTENT_RELEVANCE_LEVEL")
            .as_deref()
            .map(parse_i32)
            .transpose()?
            .unwrap_or(3);

        let llm = llm_from_env(capability_timeout_ms)?;

        Ok(Self {
            data_dir,
            doc_csv,
            query_csv,
            qrel_csv,
            intent_csv,
            output_dir,
            lexical_extra_fields,
            bm25_k1,
            bm25_b,
            fusion_method,
            hybrid_alpha,
            candidate_pool,
            rrf_k,
            fusion_top_k,
            embeddings_backend,
            embeddings_model_repo,
            embeddings_model_dir,
            embedding_batch_size,
            hash_embedding_dim,
            reranker_backend,
            reranker_model,
            reranker_cache_size,
            pair_score_band,
            pair_min_doc_similarity,
            max_turns,
            llm,
            capability_timeout_ms,
            retry_max_attempts,
            retry_base_delay_ms,
            parallel_workers,
            eval_k,
            intent_relevance_level,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.capability_timeout_ms),
        )
    }

    pub fn fusion_params(&self) -> FusionParams {
        FusionParams {
            method: self.fusion_method,
            alpha: self.hybrid_alpha,
            candidate_pool: self.candidate_pool,
            top_k: self.fusion_top_k,
            rrf_k: self.rrf_k,
        }
    }

    pub fn bm25_params(&self) -> Bm25Params {
        Bm25Params {
            k1: self.bm25_k1,
            b: self.bm25_b,
        }
    }

    pub fn pair_criteria(&self) -> PairCriteria {
        PairCriteria {
            score_band: self.pair_score_band,
            min_doc_similarity: self.pair_min_doc_similarity,
        }
    }

    /// Resolve a user-supplied path: absolute as-is, relative to the output dir otherwise
    pub fn resolve_output_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() || path.exists() {
            path.to_path_buf()
        } else {
            self.output_dir.join(path)
        }
    }
}

fn llm_from_env(timeout_ms: u64) -> Result<LlmConfig> {
    let backend = optional_env("LLM_BACKEND")
        .as_deref()
        .map(parse_llm_backend)
        .transpose()?
        .unwrap_or(LlmBackend::Gemini);

    let (default_model, api_key) = match backend {
        LlmBackend::Gemini => (
            "gemini-2.5-flash-lite",
            optional_env("GOOGLE_API_KEY").or_else(|| optional_env("GEMINI_API_KEY")),
        ),
        LlmBackend::OpenAi => ("gpt-4o-mini", optional_env("OPENAI_API_KEY")),
    };

    let model = optional_env("LLM_MODEL").unwrap_or_else(|| default_model.to_string());

    let temperature = optional_env("LLM_TEMPERATURE")
        .as_deref()
        .map(parse_any_f32)
        .transpose()?
        .unwrap_or(0.2);
    if !(0.0..=2.0).contains(&temperature) {
        return Err(anyhow!("LLM_TEMPERATURE must be in 0..=2"));
    }

    let max_tokens = optional_env("LLM_MAX_TOKENS")
        .as_deref()
        .map(parse_u64)
        .transpose()?
        .unwrap_or(1024)
        .clamp(1, u32::MAX as u64) as u32;

    Ok(LlmConfig {
        backend,
        model,
        api_key,
        temperature,
        max_tokens,
        timeout_ms,
    })
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|v| {
        let v = v.trim().to_string();
        if v.is_empty() {
            None
        } else {
            Some(v)
        }
    })
}

fn canonicalize_dir(path: &Path) -> Result<PathBuf> {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .context("Failed to get current_dir")?
            .join(path)
    };
    let meta = std::fs::metadata(&path)
        .with_context(|| format!("Path does not exist: {}", path.display()))?;
    if !meta.is_dir() {
        return Err(anyhow!("Expected directory, got file: {}", path.display()));
    }
    path.canonicalize()
        .with_context(|| format!("Failed to canonicalize: {}", path.display()))
}

fn default_path(base_dir: &Path, key: &str, default_rel: &str) -> Result<PathBuf> {
    let raw = optional_env(key).unwrap_or_else(|| default_rel.to_string());
    let path = Path::new(&raw);
    Ok(if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    })
}

fn parse_csv_or_default(value: Option<&str>, default: &[&str]) -> Vec<String> {
    match value {
        Some(v) => parse_csv(v),
        None => default.iter().map(|s| (*s).to_string()).collect(),
    }
}

fn parse_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn parse_embeddings_backend(value: &str) -> Result<EmbeddingsBackend> {
    match value.trim().to_lowercase().as_str() {
        "fastembed" => Ok(EmbeddingsBackend::FastEmbed),
        "hash" => Ok(EmbeddingsBackend::Hash),
        other => Err(anyhow!("Invalid EMBEDDINGS_BACKEND: {other}")),
    }
}

fn parse_reranker_backend(value: &str) -> Result<RerankerBackend> {
    match value.trim().to_lowercase().as_str() {
        "fastembed" | "cross-encoder" | "cross_encoder" => Ok(RerankerBackend::FastEmbed),
        "overlap" => Ok(RerankerBackend::Overlap),
        "none" | "off" => Ok(RerankerBackend::None),
        other => Err(anyhow!("Invalid RERANKER_BACKEND: {other}")),
    }
}

fn parse_llm_backend(value: &str) -> Result<LlmBackend> {
    match value.trim().to_lowercase().as_str() {
        "gemini" | "google" => Ok(LlmBackend::Gemini),
        "openai" => Ok(LlmBackend::OpenAi),
        other => Err(anyhow!("Invalid LLM_BACKEND: {other}")),
    }
}

fn parse_usize(value: &str) -> Result<usize> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|err| anyhow!("Invalid integer '{value}': {err}"))
}

fn parse_u64(value: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|err| anyhow!("Invalid integer '{value}': {err}"))
}

fn parse_i32(value: &str) -> Result<i32> {
    value
        .trim()
        .parse::<i32>()
        .map_err(|err| anyhow!("Invalid integer '{value}': {err}"))
}

fn parse_unit_f32(key: &str, value: &str) -> Result<f32> {
    let v = parse_any_f32(value)?;
    if !(0.0..=1.0).contains(&v) {
        return Err(anyhow!("{key} must be in 0..=1"));
    }
    Ok(v)
}

fn parse_any_f32(value: &str) -> Result<f32> {
    value
        .trim()
        .parse::<f32>()
        .map_err(|err| anyhow!("Invalid float '{value}': {err}"))
}
