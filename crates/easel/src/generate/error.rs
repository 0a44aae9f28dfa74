//! Provider error types.
//!
//! These never cross the queue boundary: every variant is absorbed into a
//! retry or a placeholder result before the approval pipeline sees it.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    /// The configured API key environment variable was not set.
    #[error("Provider API key is not configured")]
    MissingApiKey,

    /// Transport-level failure (connect, timeout, body read).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("Provider returned status {status}: {message}")]
    Api { status: u16, message: String },

    /// The provider answered 2xx but the body was not usable.
    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
}
