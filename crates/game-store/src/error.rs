//! Storage error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage quota exceeded: {needed} bytes needed, {quota} allowed")]
    Capacity { needed: usize, quota: usize },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Game not found: {0}")]
    NotFound(String),

    #[error("Invalid game record: {0}")]
    InvalidRecord(#[from] validator::ValidationErrors),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}
