use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EaselError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Review error: {0}")]
    Review(#[from] ReviewError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

/// Errors surfaced by the approval state machine and batch orchestrator.
///
/// These map one-to-one onto caller-facing failures: the route layer
/// translates them into HTTP responses. Provider failures never appear
/// here — the generation queue absorbs them into fallback results.
#[derive(Error, Debug)]
pub enum ReviewError {
    /// Malformed input (empty prompt content, bad decision value).
    #[error("Invalid input: {0}")]
    Validation(String),

    /// The entity is not in the state the operation requires
    /// (already-reviewed prompt/image, duplicate pending prompt).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Referenced entity does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The teacher lacks credits for the requested operation.
    #[error("Insufficient credits: {required} required, {available} available")]
    InsufficientCredits { required: i64, available: i64 },

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

pub type Result<T> = std::result::Result<T, EaselError>;
