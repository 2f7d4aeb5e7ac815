use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Session history is empty")]
    EmptyHistory,
    #[error("Keyword query is empty")]
    EmptyQuery,
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Embedding backend error: {0}")]
    Backend(String),
    #[error("Invalid argument: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, RecError>;
