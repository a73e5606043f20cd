use crate::embeddings::Embedder;
use anyhow::{anyhow, Result};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::Path;

pub const DEFAULT_MODEL: &str = "intfloat/multilingual-e5-small";

const SUPPORTED: &[(&str, EmbeddingModel, usize)] = &[
    ("intfloat/multilingual-e5-small", EmbeddingModel::MultilingualE5Small, 384),
    ("intfloat/multilingual-e5-base", EmbeddingModel::MultilingualE5Base, 768),
    (
        "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2",
        EmbeddingModel::ParaphraseMLMiniLML12V2,
        384,
    ),
    ("sentence-transformers/all-MiniLM-L6-v2", EmbeddingModel::AllMiniLML6V2, 384),
    ("BAAI/bge-small-en-v1.5", EmbeddingModel::BGESmallENV15, 384),
    ("BAAI/bge-base-en-v1.5", EmbeddingModel::BGEBaseENV15, 768),
];

pub struct FastEmbedder {
    model: TextEmbedding,
    dim: usize,
}

impl FastEmbedder {
    pub fn new(model_name: &str, cache_dir: Option<&Path>) -> Result<Self> {
        let (model_enum, dim) = SUPPORTED
            .iter()
            .find(|(name, _, _)| *name == model_name)
            .map(|(_, model, dim)| (model.clone(), *dim))
            .ok_or_else(|| {
                let names: Vec<&str> = SUPPORTED.iter().map(|(name, _, _)| *name).collect();
                anyhow!(
                    "Unsupported model for FastEmbed: {}. Supported: {}",
                    model_name,
                    names.join(", ")
                )
            })?;

        let mut options = InitOptions::new(model_enum);
        if let Some(path) = cache_dir {
            options = options.with_cache_dir(path.to_path_buf());
        }

        tracing::info!(model = model_name, "Initializing FastEmbed embedder");
        let model = TextEmbedding::try_new(options)
            .map_err(|e| anyhow!("Failed to initialize FastEmbed: {}", e))?;

        Ok(Self { model, dim })
    }
}

impl Embedder for FastEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.model
            .embed(texts.to_vec(), None)
            .map_err(|e| anyhow!("Embedding failed: {}", e))
    }
}
