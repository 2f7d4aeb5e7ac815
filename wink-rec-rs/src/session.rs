//! Session persistence: an append-only list of turns per session id.
//!
//! The store does no locking; it assumes one writer per session.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;
use walkdir::WalkDir;

use crate::error::{RecError, Result};
use crate::keywords::{KeywordSet, SessionHistory};

/// Persistence seam for session histories.
pub trait SessionStore {
    fn load(&self, id: &str) -> Result<SessionHistory>;
    fn append(&self, id: &str, keywords: KeywordSet) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedTrack {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub input_text: String,
    #[serde(default)]
    pub merged_sentence: String,
    pub keywords: KeywordSet,
    #[serde(default)]
    pub recommended: Vec<RecommendedTrack>,
}

impl Turn {
    pub fn new(keywords: KeywordSet) -> Self {
        Self {
            timestamp: Utc::now(),
            input_text: String::new(),
            merged_sentence: String::new(),
            keywords,
            recommended: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub turns: Vec<Turn>,
}

impl SessionRecord {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            started_at: Utc::now(),
            ended_at: None,
            turns: Vec::new(),
        }
    }

    pub fn history(&self) -> SessionHistory {
        self.turns.iter().map(|t| t.keywords.clone()).collect()
    }

    /// Every track id recommended so far in this session.
    pub fn seen_track_ids(&self) -> HashSet<String> {
        self.turns
            .iter()
            .flat_map(|t| t.recommended.iter().map(|r| r.id.clone()))
            .collect()
    }

    /// Numbered summary of how the user's intent evolved, one line per turn.
    pub fn history_summary(&self) -> String {
        let lines: Vec<String> = self
            .turns
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.merged_sentence.is_empty() || !t.keywords.is_empty())
            .map(|(i, t)| {
                let mut line = format!("{}) {}", i + 1, t.merged_sentence);
                if !t.keywords.is_empty() {
                    line.push_str(&format!(" (keywords: {})", t.keywords.tokens().join(", ")));
                }
                line
            })
            .collect();
        if lines.is_empty() {
            return String::new();
        }
        format!("User Intent Evolution:\n{}", lines.join("\n"))
    }
}

/// One `session_<id>.json` document per session under `dir`.
#[derive(Debug, Clone)]
pub struct JsonSessionStore {
    dir: PathBuf,
}

impl JsonSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, id: &str) -> Result<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(RecError::Invalid(format!("bad session id: {id:?}")));
        }
        Ok(self.dir.join(format!("session_{id}.json")))
    }

    /// Start a new session with a fresh 6-hex-digit id.
    pub fn create(&self) -> Result<SessionRecord> {
        fs::create_dir_all(&self.dir)?;
        let mut rng = rand::thread_rng();
        let id = loop {
            let candidate = format!("{:06x}", rng.gen::<u32>() & 0x00ff_ffff);
            if !self.path(&candidate)?.exists() {
                break candidate;
            }
        };
        let record = SessionRecord::new(id);
        self.save(&record)?;
        info!(session = %record.session_id, "created session");
        Ok(record)
    }

    pub fn record(&self, id: &str) -> Result<SessionRecord> {
        let path = self.path(id)?;
        if !path.exists() {
            return Err(RecError::SessionNotFound(id.to_string()));
        }
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    pub fn save(&self, record: &SessionRecord) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(&record.session_id)?;
        fs::write(path, serde_json::to_string_pretty(record)?)?;
        Ok(())
    }

    pub fn record_turn(&self, id: &str, turn: Turn) -> Result<()> {
        let mut record = self.record(id)?;
        record.turns.push(turn);
        self.save(&record)?;
        info!(session = id, turns = record.turns.len(), "recorded turn");
        Ok(())
    }

    pub fn close(&self, id: &str) -> Result<SessionRecord> {
        let mut record = self.record(id)?;
        record.ended_at.get_or_insert_with(Utc::now);
        self.save(&record)?;
        Ok(record)
    }

    pub fn seen_track_ids(&self, id: &str) -> Result<HashSet<String>> {
        Ok(self.record(id)?.seen_track_ids())
    }

    /// Ids of every stored session, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let e = entry.map_err(|e| RecError::Invalid(e.to_string()))?;
            if !e.file_type().is_file() {
                continue;
            }
            let name = e.file_name().to_string_lossy();
            if let Some(id) = name
                .strip_prefix("session_")
                .and_then(|rest| rest.strip_suffix(".json"))
            {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl SessionStore for JsonSessionStore {
    fn load(&self, id: &str) -> Result<SessionHistory> {
        Ok(self.record(id)?.history())
    }

    fn append(&self, id: &str, keywords: KeywordSet) -> Result<()> {
        self.record_turn(id, Turn::new(keywords))
    }
}
