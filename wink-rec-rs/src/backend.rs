//! Text-embedding providers.

use crate::config::{BackendKind, EmbeddingConfig};
use crate::error::{RecError, Result};
use crate::vector::l2_normalize;

pub const DEFAULT_DIM: usize = 256;

/// Trait abstraction for a text-embedding provider. Implementations must be
/// deterministic for identical input.
pub trait EmbeddingBackend {
    fn embed_text(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;
    fn dim(&self) -> usize;
    fn model_name(&self) -> &str;

    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_text(&[text])?
            .pop()
            .ok_or_else(|| RecError::Backend("backend returned no embedding".into()))
    }
}

impl EmbeddingBackend for Box<dyn EmbeddingBackend> {
    fn embed_text(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_text(texts)
    }
    fn dim(&self) -> usize {
        (**self).dim()
    }
    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

impl<B: EmbeddingBackend + ?Sized> EmbeddingBackend for &B {
    fn embed_text(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_text(texts)
    }
    fn dim(&self) -> usize {
        (**self).dim()
    }
    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// Offline backend: signed feature hashing of lowercase word tokens.
/// Texts sharing no tokens come out (nearly) orthogonal.
#[derive(Debug, Clone)]
pub struct HashingBackend {
    dim: usize,
    name: String,
}

impl HashingBackend {
    pub fn new(dim: usize) -> Self {
        Self {
            dim: dim.max(1),
            name: format!("hashing-{}", dim.max(1)),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        for token in tokenize(text) {
            let h = fnv1a(token.as_bytes());
            let idx = (h % self.dim as u64) as usize;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            v[idx] += sign;
        }
        l2_normalize(&mut v);
        v
    }
}

impl Default for HashingBackend {
    fn default() -> Self {
        Self::new(DEFAULT_DIM)
    }
}

impl EmbeddingBackend for HashingBackend {
    fn embed_text(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
    fn dim(&self) -> usize {
        self.dim
    }
    fn model_name(&self) -> &str {
        &self.name
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[cfg(feature = "ollama")]
mod ollama_backend {
    use super::{EmbeddingBackend, RecError, Result};
    use crate::vector::l2_normalize;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Serialize)]
    struct EmbeddingRequest<'a> {
        model: &'a str,
        prompt: &'a str,
    }

    #[derive(Deserialize)]
    struct EmbeddingResponse {
        embedding: Vec<f32>,
    }

    /// Embeddings served by a local Ollama instance (`/api/embeddings`).
    pub struct OllamaBackend {
        client: reqwest::blocking::Client,
        base_url: String,
        model: String,
        dim: usize,
    }

    impl OllamaBackend {
        pub fn new(base_url: &str, model: &str, dim: usize) -> Result<Self> {
            let client = reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .map_err(|e| RecError::Backend(e.to_string()))?;
            Ok(Self {
                client,
                base_url: base_url.trim_end_matches('/').to_string(),
                model: model.to_string(),
                dim,
            })
        }

        fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
            let url = format!("{}/api/embeddings", self.base_url);
            let resp: EmbeddingResponse = self
                .client
                .post(&url)
                .json(&EmbeddingRequest {
                    model: &self.model,
                    prompt: text,
                })
                .send()
                .and_then(|r| r.error_for_status())
                .and_then(|r| r.json())
                .map_err(|e| RecError::Backend(format!("{url}: {e}")))?;
            let mut v = resp.embedding;
            if v.len() != self.dim {
                return Err(RecError::DimensionMismatch {
                    expected: self.dim,
                    got: v.len(),
                });
            }
            l2_normalize(&mut v);
            Ok(v)
        }
    }

    impl EmbeddingBackend for OllamaBackend {
        fn embed_text(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            texts.iter().map(|t| self.embed_one(t)).collect()
        }
        fn dim(&self) -> usize {
            self.dim
        }
        fn model_name(&self) -> &str {
            &self.model
        }
    }
}

#[cfg(feature = "ollama")]
pub use ollama_backend::OllamaBackend;

/// Instantiate the backend selected in the `[embedding]` config section.
pub fn from_config(cfg: &EmbeddingConfig) -> Result<Box<dyn EmbeddingBackend>> {
    match cfg.backend {
        BackendKind::Hashing => Ok(Box::new(HashingBackend::new(cfg.dim))),
        #[cfg(feature = "ollama")]
        BackendKind::Ollama => Ok(Box::new(OllamaBackend::new(
            &cfg.ollama_url,
            &cfg.model,
            cfg.dim,
        )?)),
        #[cfg(not(feature = "ollama"))]
        BackendKind::Ollama => Err(RecError::Invalid(
            "ollama backend requires building with --features ollama".into(),
        )),
    }
}
