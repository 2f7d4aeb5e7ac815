//! Song records for both corpora and their loaders.
//!
//! Records are validated once at load time: rows without an identifier or
//! title are dropped, blank tag strings become `None`, and non-numeric audio
//! cells are left out of the feature map.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{RecError, Result};

const JAMENDO_PREVIEW_BASE_URL: &str = "https://storage.mp3-jamendo.com/download.php?trackid=";

/// Common accessors over both record kinds.
pub trait Track {
    fn id(&self) -> &str;
    fn title(&self) -> &str;
    fn artist(&self) -> &str;
    fn album(&self) -> &str;
}

/// A song from the tagged (semantic search) corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedSong {
    pub track_id: String,
    pub track_name: String,
    #[serde(default)]
    pub artist_name: String,
    #[serde(default)]
    pub album_name: String,
    #[serde(default)]
    pub genre_tags: Option<String>,
    #[serde(default)]
    pub mood_tags: Option<String>,
    /// Seconds
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub url: Option<String>,
}

impl TaggedSong {
    pub fn genre(&self) -> &str {
        self.genre_tags.as_deref().unwrap_or("")
    }

    pub fn mood(&self) -> &str {
        self.mood_tags.as_deref().unwrap_or("")
    }

    /// Genre and mood tags joined into the text that gets indexed.
    pub fn tag_text(&self) -> String {
        format!("{} {}", self.genre(), self.mood()).trim().to_string()
    }

    pub fn has_mood(&self) -> bool {
        !self.mood().trim().is_empty()
    }

    /// MP3 preview URL for `track_<n>` identifiers.
    pub fn preview_url(&self) -> Option<String> {
        let n: u64 = self.track_id.strip_prefix("track_")?.parse().ok()?;
        Some(format!("{JAMENDO_PREVIEW_BASE_URL}{n}&format=mp3"))
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.duration
            .filter(|d| d.is_finite() && *d >= 0.0)
            .map(|d| (d * 1000.0).round() as u64)
    }

    fn clean(mut self) -> Option<Self> {
        if self.track_id.trim().is_empty() || self.track_name.trim().is_empty() {
            return None;
        }
        for tags in [&mut self.genre_tags, &mut self.mood_tags] {
            if tags.as_deref().map_or(false, |t| t.trim().is_empty()) {
                *tags = None;
            }
        }
        Some(self)
    }
}

impl Track for TaggedSong {
    fn id(&self) -> &str {
        &self.track_id
    }
    fn title(&self) -> &str {
        &self.track_name
    }
    fn artist(&self) -> &str {
        &self.artist_name
    }
    fn album(&self) -> &str {
        &self.album_name
    }
}

/// A song from the audio-feature corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatureSong {
    pub id: String,
    pub track_name: String,
    #[serde(default)]
    pub artist_name: String,
    #[serde(default)]
    pub album_name: String,
    #[serde(default)]
    pub features: BTreeMap<String, f64>,
}

impl AudioFeatureSong {
    pub fn feature(&self, name: &str) -> Option<f64> {
        self.features.get(name).copied().filter(|v| v.is_finite())
    }
}

impl Track for AudioFeatureSong {
    fn id(&self) -> &str {
        &self.id
    }
    fn title(&self) -> &str {
        &self.track_name
    }
    fn artist(&self) -> &str {
        &self.artist_name
    }
    fn album(&self) -> &str {
        &self.album_name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SongRecord {
    Tagged(TaggedSong),
    AudioFeature(AudioFeatureSong),
}

impl Track for SongRecord {
    fn id(&self) -> &str {
        match self {
            SongRecord::Tagged(s) => s.id(),
            SongRecord::AudioFeature(s) => s.id(),
        }
    }
    fn title(&self) -> &str {
        match self {
            SongRecord::Tagged(s) => s.title(),
            SongRecord::AudioFeature(s) => s.title(),
        }
    }
    fn artist(&self) -> &str {
        match self {
            SongRecord::Tagged(s) => s.artist(),
            SongRecord::AudioFeature(s) => s.artist(),
        }
    }
    fn album(&self) -> &str {
        match self {
            SongRecord::Tagged(s) => s.album(),
            SongRecord::AudioFeature(s) => s.album(),
        }
    }
}

impl SongRecord {
    /// Preview URL for tagged songs; audio-feature rows carry none.
    pub fn preview_url(&self) -> Option<String> {
        match self {
            SongRecord::Tagged(s) => s.preview_url(),
            SongRecord::AudioFeature(_) => None,
        }
    }

    pub fn duration_ms(&self) -> Option<u64> {
        match self {
            SongRecord::Tagged(s) => s.duration_ms(),
            SongRecord::AudioFeature(_) => None,
        }
    }
}

/// A record plus its score under one ranking strategy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate<T> {
    #[serde(flatten)]
    pub record: T,
    pub score: f32,
}

impl<T> ScoredCandidate<T> {
    pub fn new(record: T, score: f32) -> Self {
        Self { record, score }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ScoredCandidate<U> {
        ScoredCandidate {
            record: f(self.record),
            score: self.score,
        }
    }
}

impl<T: Track> Track for ScoredCandidate<T> {
    fn id(&self) -> &str {
        self.record.id()
    }
    fn title(&self) -> &str {
        self.record.title()
    }
    fn artist(&self) -> &str {
        self.record.artist()
    }
    fn album(&self) -> &str {
        self.record.album()
    }
}

/// Sort descending by score; ties keep their input order.
pub fn sort_by_score<T>(candidates: &mut [ScoredCandidate<T>]) {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

/// Load the tagged corpus from a JSON array or a CSV file with a header row.
pub fn load_tagged(path: &Path) -> Result<Vec<TaggedSong>> {
    let raw: Vec<TaggedSong> = if is_csv(path) {
        csv::Reader::from_path(path)?
            .deserialize()
            .collect::<std::result::Result<_, _>>()?
    } else {
        serde_json::from_reader(BufReader::new(File::open(path)?))?
    };
    let total = raw.len();
    let songs: Vec<TaggedSong> = raw.into_iter().filter_map(TaggedSong::clean).collect();
    if songs.len() < total {
        warn!(
            dropped = total - songs.len(),
            "tagged corpus rows without id or title"
        );
    }
    info!(path = %path.display(), songs = songs.len(), "loaded tagged corpus");
    Ok(songs)
}

const AUDIO_META_COLUMNS: [&str; 4] = ["id", "track_name", "artist_name", "album_name"];

/// Load the audio-feature corpus. In CSV form every numeric column other than
/// the metadata columns becomes a feature; empty or non-numeric cells are
/// left out so the ranker can tell missing data apart.
pub fn load_audio(path: &Path) -> Result<Vec<AudioFeatureSong>> {
    let raw = if is_csv(path) {
        read_audio_csv(path)?
    } else {
        serde_json::from_reader::<_, Vec<AudioFeatureSong>>(BufReader::new(File::open(path)?))?
    };
    let total = raw.len();
    let songs: Vec<AudioFeatureSong> = raw
        .into_iter()
        .filter(|s| !s.id.trim().is_empty() && !s.track_name.trim().is_empty())
        .collect();
    if songs.len() < total {
        warn!(
            dropped = total - songs.len(),
            "audio corpus rows without id or title"
        );
    }
    info!(path = %path.display(), songs = songs.len(), "loaded audio-feature corpus");
    Ok(songs)
}

fn read_audio_csv(path: &Path) -> Result<Vec<AudioFeatureSong>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h.trim() == name);
    let (id_col, title_col) = match (column("id"), column("track_name")) {
        (Some(i), Some(t)) => (i, t),
        _ => {
            return Err(RecError::Invalid(format!(
                "{}: audio corpus needs `id` and `track_name` columns",
                path.display()
            )))
        }
    };
    let artist_col = column("artist_name");
    let album_col = column("album_name");

    let mut songs = Vec::new();
    for row in reader.records() {
        let row = row?;
        let cell = |i: Option<usize>| {
            i.and_then(|i| row.get(i))
                .unwrap_or("")
                .trim()
                .to_string()
        };
        let mut features = BTreeMap::new();
        for (i, name) in headers.iter().enumerate() {
            let name = name.trim();
            if AUDIO_META_COLUMNS.contains(&name) {
                continue;
            }
            if let Some(v) = row.get(i).and_then(|c| c.trim().parse::<f64>().ok()) {
                if v.is_finite() {
                    features.insert(name.to_string(), v);
                }
            }
        }
        songs.push(AudioFeatureSong {
            id: cell(Some(id_col)),
            track_name: cell(Some(title_col)),
            artist_name: cell(artist_col),
            album_name: cell(album_col),
            features,
        });
    }
    Ok(songs)
}
