//! Keyword-history embedder: turns a [`SessionHistory`] into a user vector.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::EmbeddingBackend;
use crate::error::{RecError, Result};
use crate::keywords::{KeywordSet, SessionHistory};
use crate::vector::EmbeddingVector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingMode {
    /// Only the most recent keyword set
    Latest,
    /// Recency-weighted blend of every keyword set
    #[default]
    Weighted,
}

/// Linear recency weights: 0.5 for the oldest turn up to 1.0 for the newest.
/// A single turn gets 1.0.
pub fn recency_weights(n: usize) -> Vec<f32> {
    match n {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => (0..n)
            .map(|i| 0.5 + 0.5 * (i as f32 / (n - 1) as f32))
            .collect(),
    }
}

pub struct HistoryEmbedder<B: EmbeddingBackend> {
    backend: B,
}

impl<B: EmbeddingBackend> HistoryEmbedder<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn embed(&self, history: &SessionHistory, mode: EmbeddingMode) -> Result<EmbeddingVector> {
        match mode {
            EmbeddingMode::Latest => self.latest(history),
            EmbeddingMode::Weighted => self.weighted(history),
        }
    }

    pub fn latest(&self, history: &SessionHistory) -> Result<EmbeddingVector> {
        let last = history.latest().ok_or(RecError::EmptyHistory)?;
        self.embed_set(last)
    }

    pub fn weighted(&self, history: &SessionHistory) -> Result<EmbeddingVector> {
        if history.is_empty() {
            return Err(RecError::EmptyHistory);
        }
        let texts: Vec<String> = history.iter().map(KeywordSet::joined).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let embeddings: Vec<EmbeddingVector> = self
            .backend
            .embed_text(&refs)?
            .into_iter()
            .map(EmbeddingVector::normalized)
            .collect();
        let weights = recency_weights(embeddings.len());
        debug!(turns = embeddings.len(), ?weights, "blending keyword history");
        EmbeddingVector::blend(&embeddings, &weights)
    }

    fn embed_set(&self, set: &KeywordSet) -> Result<EmbeddingVector> {
        Ok(EmbeddingVector::normalized(
            self.backend.embed_query(&set.joined())?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HashingBackend;

    fn history(sets: &[&str]) -> SessionHistory {
        sets.iter().map(|s| KeywordSet::parse(s)).collect()
    }

    #[test]
    fn weights_for_four_turns() {
        let w = recency_weights(4);
        let expected = [0.5, 0.667, 0.833, 1.0];
        for (got, want) in w.iter().zip(expected) {
            assert!((got - want).abs() < 1e-3, "{got} vs {want}");
        }
    }

    #[test]
    fn empty_history_fails_fast() {
        let e = HistoryEmbedder::new(HashingBackend::default());
        let empty = SessionHistory::new();
        assert!(matches!(e.latest(&empty), Err(RecError::EmptyHistory)));
        assert!(matches!(e.weighted(&empty), Err(RecError::EmptyHistory)));
    }

    #[test]
    fn single_turn_weighted_equals_latest() {
        let e = HistoryEmbedder::new(HashingBackend::default());
        let h = history(&["rain calm"]);
        let latest = e.latest(&h).unwrap();
        let weighted = e.weighted(&h).unwrap();
        for (a, b) in latest.as_slice().iter().zip(weighted.as_slice()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn weighted_favors_newest_turn() {
        let backend = HashingBackend::default();
        let e = HistoryEmbedder::new(&backend);
        let h = history(&["rain calm", "night jazzy dreamy"]);
        let user = e.embed(&h, EmbeddingMode::Weighted).unwrap();
        assert!((user.norm() - 1.0).abs() < 1e-5);

        let old = EmbeddingVector::normalized(backend.embed_query("rain calm").unwrap());
        let new = EmbeddingVector::normalized(backend.embed_query("night jazzy dreamy").unwrap());
        let to_old = user.dot(&old).unwrap();
        let to_new = user.dot(&new).unwrap();
        assert!(to_new > to_old);
        assert!((to_new / to_old - 2.0).abs() < 0.1);
    }
}
