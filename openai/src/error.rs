//! Error types for the OpenAI-compatible client.

use mnema_core::MemoryError;
use thiserror::Error;

/// Errors that can arise when calling an OpenAI-compatible API.
#[derive(Debug, Error)]
pub enum OpenAIError {
    /// HTTP layer errors.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Non-success responses from the API.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the error body, or the raw body.
        message: String,
    },
    /// Responses missing the data the call was made for.
    #[error("{0}")]
    MissingData(String),
}

impl OpenAIError {
    /// Wraps into the caller-facing error surface for a chat operation.
    #[must_use]
    pub fn into_llm_error(self, op: &str) -> MemoryError {
        match self {
            Self::Http(err) if err.is_connect() || err.is_timeout() => {
                MemoryError::connection_failed(op, err.to_string()).with_source(err)
            }
            other => MemoryError::llm(op, other.to_string()).with_source(other),
        }
    }

    /// Wraps into the caller-facing error surface for an embedding
    /// operation.
    #[must_use]
    pub fn into_embedding_error(self, op: &str) -> MemoryError {
        match self {
            Self::Http(err) if err.is_connect() || err.is_timeout() => {
                MemoryError::connection_failed(op, err.to_string()).with_source(err)
            }
            other => MemoryError::embedding_failed(op, other.to_string()).with_source(other),
        }
    }
}
