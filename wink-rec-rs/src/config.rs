//! Tunable knobs for the whole pipeline, loadable from a TOML file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backend::DEFAULT_DIM;
use crate::error::{RecError, Result};
use crate::history::EmbeddingMode;

pub const DEFAULT_FEATURE_COLUMNS: &[&str] = &[
    "acousticness",
    "danceability",
    "energy",
    "instrumentalness",
    "liveness",
    "loudness",
    "speechiness",
    "valence",
    "tempo",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub embedding: EmbeddingConfig,
    pub semantic: SemanticConfig,
    pub audio: AudioConfig,
    pub postprocess: PostProcessConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Hashing,
    Ollama,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: BackendKind,
    pub dim: usize,
    pub ollama_url: String,
    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Hashing,
            dim: DEFAULT_DIM,
            ollama_url: "http://localhost:11434".into(),
            model: "all-minilm".into(),
        }
    }
}

/// Blend policy for tag-based semantic search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticConfig {
    pub candidate_pool: usize,
    pub fallback_candidate_pool: usize,
    pub keyword_weight: f32,
    pub genre_mood_weight: f32,
    pub genre_weight: f32,
    pub mood_weight: f32,
    /// Added once per keyword found literally in the tag text
    pub tag_bonus: f32,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            candidate_pool: 80,
            fallback_candidate_pool: 160,
            keyword_weight: 0.4,
            genre_mood_weight: 0.6,
            genre_weight: 0.4,
            mood_weight: 0.6,
            tag_bonus: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub feature_columns: Vec<String>,
    pub dedup_artist_title: bool,
    pub mode: EmbeddingMode,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            feature_columns: DEFAULT_FEATURE_COLUMNS.iter().map(|s| s.to_string()).collect(),
            dedup_artist_title: true,
            mode: EmbeddingMode::Weighted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessConfig {
    pub ranked_top_k: usize,
    pub fallback_top_k: usize,
    pub result_count: usize,
    /// Albums whose name contains any of these (case-insensitive) are dropped
    pub excluded_album_substrings: Vec<String>,
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            ranked_top_k: 15,
            fallback_top_k: 40,
            result_count: 3,
            excluded_album_substrings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub tagged_corpus: PathBuf,
    pub audio_corpus: PathBuf,
    /// Precomputed descriptor embeddings; rebuilt from the backend when absent
    pub feature_embeddings: Option<PathBuf>,
    pub session_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            tagged_corpus: PathBuf::from("data/tagged_songs.csv"),
            audio_corpus: PathBuf::from("data/audio_features.csv"),
            feature_embeddings: None,
            session_dir: PathBuf::from("sessions"),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let cfg: Config = toml::from_str(&fs::read_to_string(path)?)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.semantic;
        let weights = [
            ("keyword_weight", s.keyword_weight),
            ("genre_mood_weight", s.genre_mood_weight),
            ("genre_weight", s.genre_weight),
            ("mood_weight", s.mood_weight),
            ("tag_bonus", s.tag_bonus),
        ];
        for (name, w) in weights {
            if !w.is_finite() || w < 0.0 {
                return Err(RecError::Invalid(format!("semantic.{name} must be >= 0, got {w}")));
            }
        }
        if s.candidate_pool == 0 || s.fallback_candidate_pool < s.candidate_pool {
            return Err(RecError::Invalid(
                "semantic pools must satisfy 1 <= candidate_pool <= fallback_candidate_pool".into(),
            ));
        }
        let p = &self.postprocess;
        if p.result_count == 0 || p.ranked_top_k == 0 || p.fallback_top_k < p.ranked_top_k {
            return Err(RecError::Invalid(
                "postprocess needs result_count >= 1 and 1 <= ranked_top_k <= fallback_top_k".into(),
            ));
        }
        if self.audio.feature_columns.is_empty() {
            return Err(RecError::Invalid("audio.feature_columns is empty".into()));
        }
        if self.embedding.dim == 0 {
            return Err(RecError::Invalid("embedding.dim must be > 0".into()));
        }
        Ok(())
    }
}
