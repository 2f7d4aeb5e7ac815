//! Single parameterized recommendation pipeline over either strategy.

use std::cell::OnceCell;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::audio::AudioFeatureRanker;
use crate::backend::EmbeddingBackend;
use crate::config::Config;
use crate::corpus::{self, AudioFeatureSong, ScoredCandidate, SongRecord, TaggedSong};
use crate::error::{RecError, Result};
use crate::features::{FeatureSet, FeatureSimilarity};
use crate::history::{EmbeddingMode, HistoryEmbedder};
use crate::keywords::{KeywordSet, SessionHistory};
use crate::postprocess::{select_with_fallback, ExclusionFilter, Pass};
use crate::semantic::{InMemorySongIndex, SemanticRanker};
use crate::vector::EmbeddingVector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Tag-based semantic search over the tagged corpus
    #[default]
    #[value(name = "tag")]
    TagSearch,
    /// Feature-similarity weighting of audio features
    #[value(name = "audio")]
    AudioFeature,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub strategy: Strategy,
    pub keywords: KeywordSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_similarities: Option<FeatureSimilarity>,
    pub songs: Vec<ScoredCandidate<SongRecord>>,
}

/// Owns the embedding backend and the read-only reference data. Corpora and
/// descriptor embeddings are loaded on first use and kept for the lifetime
/// of the value.
pub struct Recommender<B: EmbeddingBackend> {
    backend: B,
    config: Config,
    exclusion: ExclusionFilter,
    index: OnceCell<InMemorySongIndex>,
    audio_songs: OnceCell<Vec<AudioFeatureSong>>,
    features: OnceCell<FeatureSet>,
}

impl<B: EmbeddingBackend> Recommender<B> {
    pub fn new(backend: B, config: Config) -> Self {
        let exclusion = ExclusionFilter::new(&config.postprocess.excluded_album_substrings);
        Self {
            backend,
            config,
            exclusion,
            index: OnceCell::new(),
            audio_songs: OnceCell::new(),
            features: OnceCell::new(),
        }
    }

    /// Use `songs` instead of reading `paths.tagged_corpus`.
    pub fn with_tagged_songs(mut self, songs: Vec<TaggedSong>) -> Result<Self> {
        self.index = OnceCell::from(InMemorySongIndex::build(&self.backend, songs)?);
        Ok(self)
    }

    /// Use `songs` instead of reading `paths.audio_corpus`.
    pub fn with_audio_songs(mut self, songs: Vec<AudioFeatureSong>) -> Self {
        self.audio_songs = OnceCell::from(songs);
        self
    }

    pub fn with_features(mut self, features: FeatureSet) -> Self {
        self.features = OnceCell::from(features);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&self) -> Result<&InMemorySongIndex> {
        if let Some(index) = self.index.get() {
            return Ok(index);
        }
        let songs = corpus::load_tagged(&self.config.paths.tagged_corpus)?;
        let built = InMemorySongIndex::build(&self.backend, songs)?;
        Ok(self.index.get_or_init(|| built))
    }

    pub fn audio_songs(&self) -> Result<&[AudioFeatureSong]> {
        if let Some(songs) = self.audio_songs.get() {
            return Ok(songs);
        }
        let loaded = corpus::load_audio(&self.config.paths.audio_corpus)?;
        Ok(self.audio_songs.get_or_init(|| loaded))
    }

    /// Precomputed descriptor embeddings when configured and present,
    /// otherwise embedded with the current backend.
    pub fn feature_set(&self) -> Result<&FeatureSet> {
        if let Some(set) = self.features.get() {
            return Ok(set);
        }
        let set = match &self.config.paths.feature_embeddings {
            Some(path) if path.exists() => {
                debug!(path = %path.display(), "loading feature embeddings");
                FeatureSet::load_json(path)?
            }
            _ => FeatureSet::build(&self.backend)?,
        };
        Ok(self.features.get_or_init(|| set))
    }

    pub fn user_vector(&self, history: &SessionHistory, mode: EmbeddingMode) -> Result<EmbeddingVector> {
        HistoryEmbedder::new(&self.backend).embed(history, mode)
    }

    pub fn feature_similarities(
        &self,
        history: &SessionHistory,
        mode: EmbeddingMode,
    ) -> Result<FeatureSimilarity> {
        let user = self.user_vector(history, mode)?;
        self.feature_set()?.similarities(&user)
    }

    /// Recommend songs for `history`, excluding ids in `seen`.
    pub fn recommend(
        &self,
        history: &SessionHistory,
        seen: &HashSet<String>,
        strategy: Strategy,
    ) -> Result<Recommendation> {
        let keywords = history.latest().ok_or(RecError::EmptyHistory)?.clone();
        let post = &self.config.postprocess;
        let rec = match strategy {
            Strategy::TagSearch => {
                let index = self.index()?;
                let sem = &self.config.semantic;
                let ranker = SemanticRanker::new(&self.backend, index, sem);
                let songs = select_with_fallback(post.result_count, seen, &self.exclusion, |pass| {
                    let (top_k, pool) = match pass {
                        Pass::Primary => (post.ranked_top_k, sem.candidate_pool),
                        Pass::Widened => (post.fallback_top_k, sem.fallback_candidate_pool),
                    };
                    ranker.rank(&keywords, top_k, pool)
                })?;
                Recommendation {
                    strategy,
                    keywords,
                    feature_similarities: None,
                    songs: songs.into_iter().map(|c| c.map(SongRecord::Tagged)).collect(),
                }
            }
            Strategy::AudioFeature => {
                let sims = self.feature_similarities(history, self.config.audio.mode)?;
                let corpus = self.audio_songs()?;
                let ranker = AudioFeatureRanker::new(&self.config.audio);
                let songs = select_with_fallback(post.result_count, seen, &self.exclusion, |pass| {
                    let top_k = match pass {
                        Pass::Primary => post.ranked_top_k,
                        Pass::Widened => post.fallback_top_k,
                    };
                    ranker.rank(&sims, corpus, top_k)
                })?;
                Recommendation {
                    strategy,
                    keywords,
                    feature_similarities: Some(sims),
                    songs: songs
                        .into_iter()
                        .map(|c| c.map(SongRecord::AudioFeature))
                        .collect(),
                }
            }
        };
        info!(
            ?strategy,
            turns = history.len(),
            songs = rec.songs.len(),
            "recommendation ready"
        );
        Ok(rec)
    }
}
