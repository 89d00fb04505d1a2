// Shoebox error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShoeboxError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Revision conflict for {0}: expected rev {1}")]
    RevisionConflict(String, i64),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Watcher error: {0}")]
    Watcher(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for ShoeboxError {
    fn from(err: anyhow::Error) -> Self {
        ShoeboxError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ShoeboxError>;
