//! Error taxonomy.
//!
//! Only collaborator operations (store writes, preset/session CRUD, import)
//! hand these to callers. The cache, mixer and timer absorb them into
//! `None`/empty results and log.

use thiserror::Error;

use crate::models::Collection;

#[derive(Debug, Error)]
pub enum ChillError {
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("record not found: {collection}/{id}")]
    RecordNotFound { collection: Collection, id: String },

    #[error("playback blocked for '{key}': {reason}")]
    PlaybackBlocked { key: String, reason: String },

    #[error("load failed: {0}")]
    LoadFailure(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unsupported source: {0}")]
    UnsupportedSource(String),
}

pub type ChillResult<T> = Result<T, ChillError>;

impl From<nine_s_core::errors::NineSError> for ChillError {
    fn from(e: nine_s_core::errors::NineSError) -> Self {
        ChillError::StoreUnavailable(e.to_string())
    }
}

impl From<serde_json::Error> for ChillError {
    fn from(e: serde_json::Error) -> Self {
        ChillError::LoadFailure(e.to_string())
    }
}

impl From<std::io::Error> for ChillError {
    fn from(e: std::io::Error) -> Self {
        ChillError::LoadFailure(e.to_string())
    }
}
