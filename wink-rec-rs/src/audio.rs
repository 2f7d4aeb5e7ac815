//! Audio-feature ranking: a linear content-based score where the user's
//! per-feature similarities weight min-max normalized audio features.

use std::collections::HashSet;

use ndarray::{Array1, Array2, Axis};
use ndarray_stats::QuantileExt;
use tracing::{debug, warn};

use crate::config::AudioConfig;
use crate::corpus::{sort_by_score, AudioFeatureSong, ScoredCandidate};
use crate::error::{RecError, Result};
use crate::features::FeatureSimilarity;

pub struct AudioFeatureRanker<'a> {
    columns: &'a [String],
    dedup_artist_title: bool,
}

impl<'a> AudioFeatureRanker<'a> {
    pub fn new(cfg: &'a AudioConfig) -> Self {
        Self::with_columns(&cfg.feature_columns, cfg.dedup_artist_title)
    }

    pub fn with_columns(columns: &'a [String], dedup_artist_title: bool) -> Self {
        Self {
            columns,
            dedup_artist_title,
        }
    }

    /// Rows with every required feature present, optionally deduplicated by
    /// `(artist, title)` keeping the first occurrence.
    pub fn usable_rows<'s>(&self, songs: &'s [AudioFeatureSong]) -> Vec<&'s AudioFeatureSong> {
        let complete: Vec<&AudioFeatureSong> = songs
            .iter()
            .filter(|s| self.columns.iter().all(|c| s.feature(c).is_some()))
            .collect();
        if complete.len() < songs.len() {
            warn!(
                dropped = songs.len() - complete.len(),
                "audio rows with missing feature values"
            );
        }
        if !self.dedup_artist_title {
            return complete;
        }
        let mut seen = HashSet::new();
        complete
            .into_iter()
            .filter(|s| seen.insert((s.artist_name.as_str(), s.track_name.as_str())))
            .collect()
    }

    /// Rows x columns matrix, each column rescaled to `[0, 1]`. A constant
    /// column becomes all zeros.
    pub fn normalized_matrix(&self, rows: &[&AudioFeatureSong]) -> Result<Array2<f64>> {
        let mut m = Array2::from_shape_fn((rows.len(), self.columns.len()), |(r, c)| {
            rows[r].feature(&self.columns[c]).unwrap_or(0.0)
        });
        if rows.is_empty() {
            return Ok(m);
        }
        for mut col in m.axis_iter_mut(Axis(1)) {
            let lo = *col
                .min()
                .map_err(|e| RecError::Invalid(format!("feature column: {e}")))?;
            let hi = *col
                .max()
                .map_err(|e| RecError::Invalid(format!("feature column: {e}")))?;
            if hi > lo {
                col.mapv_inplace(|v| (v - lo) / (hi - lo));
            } else {
                col.fill(0.0);
            }
        }
        Ok(m)
    }

    pub fn rank(
        &self,
        sims: &FeatureSimilarity,
        songs: &[AudioFeatureSong],
        top_k: usize,
    ) -> Result<Vec<ScoredCandidate<AudioFeatureSong>>> {
        let rows = self.usable_rows(songs);
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let m = self.normalized_matrix(&rows)?;
        let weights: Array1<f64> = self
            .columns
            .iter()
            .map(|c| sims.get(c) as f64)
            .collect();
        let scores = m.dot(&weights);
        debug!(rows = rows.len(), "scored audio-feature corpus");

        let mut scored: Vec<ScoredCandidate<&AudioFeatureSong>> = rows
            .into_iter()
            .zip(scores.iter())
            .map(|(s, score)| ScoredCandidate::new(s, *score as f32))
            .collect();
        sort_by_score(&mut scored);
        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|c| c.map(|s| s.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn cols() -> Vec<String> {
        vec!["energy".into(), "valence".into(), "tempo".into()]
    }

    fn song(id: &str, artist: &str, vals: &[(&str, f64)]) -> AudioFeatureSong {
        AudioFeatureSong {
            id: id.into(),
            track_name: format!("Track {id}"),
            artist_name: artist.into(),
            album_name: "Album".into(),
            features: vals.iter().map(|(k, v)| (k.to_string(), *v)).collect::<BTreeMap<_, _>>(),
        }
    }

    fn sims(e: f32, v: f32, t: f32) -> FeatureSimilarity {
        [
            ("energy".to_string(), e),
            ("valence".to_string(), v),
            ("tempo".to_string(), t),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn max_row_scores_sum_of_similarities() {
        let columns = cols();
        let ranker = AudioFeatureRanker::with_columns(&columns, false);
        let songs = vec![
            song("lo", "A", &[("energy", 0.1), ("valence", 0.2), ("tempo", 80.0)]),
            song("hi", "B", &[("energy", 0.9), ("valence", 0.8), ("tempo", 160.0)]),
            song("mid", "C", &[("energy", 0.5), ("valence", 0.5), ("tempo", 120.0)]),
        ];
        let s = sims(0.3, 0.2, 0.1);
        let out = ranker.rank(&s, &songs, 3).unwrap();
        assert_eq!(out[0].record.id, "hi");
        assert!((out[0].score - 0.6).abs() < 1e-6);
        assert_eq!(out[2].record.id, "lo");
        assert_eq!(out[2].score, 0.0);
    }

    #[test]
    fn rows_with_missing_features_are_dropped() {
        let columns = cols();
        let ranker = AudioFeatureRanker::with_columns(&columns, false);
        let songs = vec![
            song("full", "A", &[("energy", 0.1), ("valence", 0.2), ("tempo", 80.0)]),
            song("gap", "B", &[("energy", 0.9), ("tempo", 160.0)]),
        ];
        let out = ranker.rank(&sims(1.0, 1.0, 1.0), &songs, 10).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].record.id, "full");
    }

    #[test]
    fn constant_column_contributes_zero() {
        let columns = cols();
        let ranker = AudioFeatureRanker::with_columns(&columns, false);
        let a = song("a", "A", &[("energy", 0.5), ("valence", 0.2), ("tempo", 100.0)]);
        let b = song("b", "B", &[("energy", 0.5), ("valence", 0.4), ("tempo", 100.0)]);
        let m = ranker.normalized_matrix(&[&a, &b]).unwrap();
        assert_eq!(m.column(0).to_vec(), vec![0.0, 0.0]);
        assert_eq!(m.column(1).to_vec(), vec![0.0, 1.0]);
    }

    #[test]
    fn dedup_by_artist_title_keeps_first() {
        let columns = cols();
        let ranker = AudioFeatureRanker::with_columns(&columns, true);
        let vals = [("energy", 0.5), ("valence", 0.2), ("tempo", 100.0)];
        let mut dup = song("b", "A", &vals);
        dup.track_name = "Track a".into();
        let songs = vec![song("a", "A", &vals), dup];
        let rows = ranker.usable_rows(&songs);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "a");
    }

    #[test]
    fn top_k_truncates_and_sorts() {
        let columns = cols();
        let ranker = AudioFeatureRanker::with_columns(&columns, false);
        let songs: Vec<AudioFeatureSong> = (0..5)
            .map(|i| {
                let x = i as f64;
                song(&format!("s{i}"), &format!("A{i}"), &[("energy", x), ("valence", x), ("tempo", x)])
            })
            .collect();
        let out = ranker.rank(&sims(0.5, 0.5, 0.5), &songs, 3).unwrap();
        let ids: Vec<&str> = out.iter().map(|c| c.record.id.as_str()).collect();
        assert_eq!(ids, ["s4", "s3", "s2"]);
    }

    #[test]
    fn empty_corpus_yields_nothing() {
        let columns = cols();
        let ranker = AudioFeatureRanker::with_columns(&columns, true);
        assert!(ranker.rank(&sims(1.0, 1.0, 1.0), &[], 5).unwrap().is_empty());
    }
}
