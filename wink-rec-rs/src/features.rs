//! Audio feature descriptors and the feature-similarity scorer.
//!
//! Each objective audio feature is described in plain language; the
//! description embeddings act as semantic axes onto which the user's keyword
//! embedding is projected.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::EmbeddingBackend;
use crate::error::{RecError, Result};
use crate::vector::EmbeddingVector;

lazy_static! {
    /// Static name -> description table for the audio features.
    pub static ref FEATURE_DESCRIPTIONS: BTreeMap<&'static str, &'static str> = BTreeMap::from([
        ("acousticness", "A confidence measure from 0.0 to 1.0 of whether the track is acoustic. 1.0 represents high confidence the track is acoustic."),
        ("danceability", "Danceability describes how suitable a track is for dancing based on a combination of musical elements including tempo, rhythm stability, beat strength, and overall regularity. A value of 0.0 is least danceable and 1.0 is most danceable."),
        ("energy", "Energy is a measure from 0.0 to 1.0 and represents a perceptual measure of intensity and activity. Typically, energetic tracks feel fast, loud, and noisy. For example, death metal has high energy, while a Bach prelude scores low on the scale. Perceptual features contributing to this attribute include dynamic range, perceived loudness, timbre, onset rate, and general entropy."),
        ("instrumentalness", "Predicts whether a track contains no vocals. 'Ooh' and 'aah' sounds are treated as instrumental in this context. Rap or spoken word tracks are clearly 'vocal'. The closer the instrumentalness value is to 1.0, the greater likelihood the track contains no vocal content. Values above 0.5 are intended to represent instrumental tracks, but confidence is higher as the value approaches 1.0."),
        ("key", "The key the track is in. Integers map to pitches using standard Pitch Class notation. E.g. 0 = C, 1 = C sharp or D flat, 2 = D, and so on. If no key was detected, the value is -1."),
        ("liveness", "Detects the presence of an audience in the recording. Higher liveness values represent an increased probability that the track was performed live. A value above 0.8 provides strong likelihood that the track is live."),
        ("loudness", "The overall loudness of a track in decibels (dB). Loudness values are averaged across the entire track and are useful for comparing relative loudness of tracks. Loudness is the quality of a sound that is the primary psychological correlate of physical strength (amplitude). Values typically range between -60 and 0 db."),
        ("mode", "Mode indicates the modality (major or minor) of a track, the type of scale from which its melodic content is derived. Major is represented by 1 and minor is 0."),
        ("speechiness", "Speechiness detects the presence of spoken words in a track. The more exclusively speech-like the recording (e.g. talk show, audio book, poetry), the closer to 1.0 the attribute value. Values above 0.66 describe tracks that are probably made entirely of spoken words. Values between 0.33 and 0.66 describe tracks that may contain both music and speech, either in sections or layered, including such cases as rap music. Values below 0.33 most likely represent music and other non-speech-like tracks."),
        ("valence", "A measure from 0.0 to 1.0 describing the musical positiveness conveyed by a track. Tracks with high valence sound more positive (e.g. happy, cheerful, euphoric), while tracks with low valence sound more negative (e.g. sad, depressed, angry)."),
        ("tempo", "The overall estimated tempo of a track in beats per minute (BPM). In musical terminology, tempo is the speed or pace of a given piece and derives directly from the average beat duration."),
    ]);
}

/// Named feature axes with unit-norm description embeddings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSet {
    descriptors: BTreeMap<String, EmbeddingVector>,
}

impl FeatureSet {
    /// Embed every entry of [`FEATURE_DESCRIPTIONS`].
    pub fn build<B: EmbeddingBackend>(backend: &B) -> Result<Self> {
        let names: Vec<&str> = FEATURE_DESCRIPTIONS.keys().copied().collect();
        let texts: Vec<&str> = FEATURE_DESCRIPTIONS.values().copied().collect();
        let embeddings = backend.embed_text(&texts)?;
        if embeddings.len() != names.len() {
            return Err(RecError::Backend(format!(
                "expected {} embeddings, got {}",
                names.len(),
                embeddings.len()
            )));
        }
        let descriptors = names
            .into_iter()
            .zip(embeddings)
            .map(|(n, e)| (n.to_string(), EmbeddingVector::normalized(e)))
            .collect();
        info!(model = backend.model_name(), "built feature descriptor embeddings");
        Ok(Self { descriptors })
    }

    /// Embeddings are re-normalized on the way in.
    pub fn from_embeddings<I>(embeddings: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<f32>)>,
    {
        Self {
            descriptors: embeddings
                .into_iter()
                .map(|(n, e)| (n, EmbeddingVector::normalized(e)))
                .collect(),
        }
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let raw: BTreeMap<String, Vec<f32>> = serde_json::from_str(&fs::read_to_string(path)?)?;
        Ok(Self::from_embeddings(raw))
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.descriptors.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&EmbeddingVector> {
        self.descriptors.get(name)
    }

    /// Project `user` onto every feature axis.
    pub fn similarities(&self, user: &EmbeddingVector) -> Result<FeatureSimilarity> {
        let mut sims = BTreeMap::new();
        for (name, axis) in &self.descriptors {
            sims.insert(name.clone(), user.dot(axis)?);
        }
        debug!(?sims, "feature similarities");
        Ok(FeatureSimilarity(sims))
    }
}

/// Per-feature cosine similarity against the current user vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSimilarity(BTreeMap<String, f32>);

impl FeatureSimilarity {
    /// Missing features count as zero.
    pub fn get(&self, name: &str) -> f32 {
        self.0.get(name).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Descending by similarity, for display.
    pub fn ranked(&self) -> Vec<(&str, f32)> {
        let mut v: Vec<(&str, f32)> = self.0.iter().map(|(k, s)| (k.as_str(), *s)).collect();
        v.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        v
    }
}

impl FromIterator<(String, f32)> for FeatureSimilarity {
    fn from_iter<T: IntoIterator<Item = (String, f32)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
