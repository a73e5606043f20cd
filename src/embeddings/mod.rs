pub mod fastembed;
pub mod hash;

use anyhow::Result;

use crate::config::EmbeddingsBackend;

pub trait Embedder {
    fn dim(&self) -> usize;
    fn embed(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Create the embedder selected by configuration.
///
/// `model_dir` is used as the model cache directory for FastEmbed;
/// `hash_dim` only applies to the hash backend.
pub fn create_embedder(
    backend: EmbeddingsBackend,
    model_dir: Option<&std::path::Path>,
    model_repo: Option<&str>,
    hash_dim: usize,
) -> Result<Box<dyn Embedder + Send>> {
    match backend {
        EmbeddingsBackend::FastEmbed => {
            let model_repo = model_repo.unwrap_or(fastembed::DEFAULT_MODEL);
            Ok(Box::new(fastembed::FastEmbedder::new(model_repo, model_dir)?))
        }
        EmbeddingsBackend::Hash => Ok(Box::new(hash::HashEmbedder::new(hash_dim))),
    }
}

/// Cosine similarity. Zero vectors compare as 0.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_handles_zero_and_parallel_vectors() {
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine(&[2.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine(&[1.0, 0.0], &[-1.0, 0.0]) < 0.0);
    }

    #[test]
    fn hash_backend_needs_no_model() {
        let mut embedder = create_embedder(EmbeddingsBackend::Hash, None, None, 32).unwrap();
        assert_eq!(embedder.dim(), 32);
        let out = embedder.embed(&["prazo recursal".to_string()]).unwrap();
        assert_eq!(out[0].len(), 32);
    }
}
