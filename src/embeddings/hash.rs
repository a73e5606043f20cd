//! Feature-hashing embedder over analyzed tokens. Deterministic and offline,
//! used for tests and for runs without a model download.

use crate::embeddings::Embedder;
use crate::text::analyze;
use anyhow::Result;

pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(8) }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        for token in analyze(text) {
            let h = fnv1a_64(token.as_bytes());
            let idx = (h as usize) % self.dim;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            v[idx] += sign;
        }
        normalize_l2(&mut v);
        v
    }
}

impl Embedder for HashEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

fn normalize_l2(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

fn fnv1a_64(data: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x00000100000001b3;
    let mut hash = OFFSET;
    for b in data {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::cosine;

    #[test]
    fn same_stems_embed_identically() {
        let mut embedder = HashEmbedder::new(64);
        let out = embedder
            .embed(&[
                "Prazo recursal".to_string(),
                "prazos recursais".to_string(),
                "competência do tribunal".to_string(),
            ])
            .unwrap();
        assert!(cosine(&out[0], &out[1]) > 0.99);
        assert!(cosine(&out[0], &out[2]) < 0.99);
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let mut embedder = HashEmbedder::new(16);
        let out = embedder.embed(&["de para o".to_string()]).unwrap();
        assert!(out[0].iter().all(|x| *x == 0.0));
    }
}
