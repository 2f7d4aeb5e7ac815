//! wink-rec core library
//!
//! Turns an accumulating history of mood/genre keyword sets into a user
//! embedding and ranks songs against it, either by tag-based semantic search
//! over a tagged corpus or by weighting objective audio features with
//! per-feature similarities.

pub mod audio;
pub mod backend;
pub mod config;
pub mod corpus;
pub mod error;
pub mod features;
pub mod history;
pub mod keywords;
pub mod pipeline;
pub mod postprocess;
pub mod semantic;
pub mod session;
pub mod vector;

pub use audio::AudioFeatureRanker;
pub use backend::{EmbeddingBackend, HashingBackend};
#[cfg(feature = "ollama")]
pub use backend::OllamaBackend;
pub use config::Config;
pub use corpus::{AudioFeatureSong, ScoredCandidate, SongRecord, TaggedSong};
pub use error::{RecError, Result};
pub use features::{FeatureSet, FeatureSimilarity};
pub use history::{EmbeddingMode, HistoryEmbedder};
pub use keywords::{KeywordSet, SessionHistory};
pub use pipeline::{Recommendation, Recommender, Strategy};
pub use postprocess::ExclusionFilter;
pub use semantic::{InMemorySongIndex, SemanticRanker, SongIndex};
pub use session::{JsonSessionStore, SessionStore};
pub use vector::EmbeddingVector;
