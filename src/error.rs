//! Error types for the parts of Jarvis with a closed set of failures.
//!
//! Application glue uses `anyhow`; the memory store and the language model
//! clients expose typed errors so callers can tell a timeout from a bad
//! status code.

use thiserror::Error;

/// Errors raised by [`crate::memory::MemoryStore`].
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("memory store lock poisoned")]
    Poisoned,
}

/// Errors raised by [`crate::llm::LanguageModel`] implementations.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("model returned no text")]
    Empty,

    #[error("model request timed out after {0} seconds")]
    Timeout(u64),

    #[error("ollama error: {0}")]
    Ollama(String),
}

pub type MemoryResult<T> = std::result::Result<T, MemoryError>;
pub type LlmResult<T> = std::result::Result<T, LlmError>;
