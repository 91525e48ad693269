//! The caller-facing error surface.
//!
//! Every fallible operation in the workspace resolves to a [`MemoryError`]
//! carrying the operation name, a value-level [`ErrorKind`], and a message.
//! Integration crates keep their own `thiserror` enums internally and wrap
//! them here at the boundary, so callers match on kinds rather than on
//! backend-specific types.

use core::fmt;

use thiserror::Error;

/// Result type used throughout the workspace.
pub type Result<T> = core::result::Result<T, MemoryError>;

/// Classification of a [`MemoryError`].
///
/// Kinds are value-level tags: the same struct type is returned everywhere
/// and the kind tells the caller what happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Id absent, or masked by access control.
    NotFound,
    /// Missing or malformed configuration at construction.
    InvalidConfig,
    /// Transport-level failure reaching a backend.
    ConnectionFailed,
    /// Embedding service declined or returned a mismatched size.
    EmbeddingFailed,
    /// Internal signal for the dedup-merge path; not surfaced to callers.
    DuplicateMemory,
    /// Empty content where content is required, or a dimension mismatch.
    InvalidInput,
    /// Catch-all from the vector store.
    StorageOperation,
    /// Transport or parsing failure of an LLM call.
    LlmOperation,
    /// Context cancellation.
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFound => "not found",
            Self::InvalidConfig => "invalid config",
            Self::ConnectionFailed => "connection failed",
            Self::EmbeddingFailed => "embedding failed",
            Self::DuplicateMemory => "duplicate memory",
            Self::InvalidInput => "invalid input",
            Self::StorageOperation => "storage operation",
            Self::LlmOperation => "llm operation",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Error returned by every public operation.
#[derive(Debug, Error)]
#[error("{op}: {message}")]
pub struct MemoryError {
    op: String,
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn core::error::Error + Send + Sync>>,
}

impl MemoryError {
    /// Creates an error with an explicit kind.
    pub fn new(kind: ErrorKind, op: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Attaches the underlying cause.
    #[must_use]
    pub fn with_source(
        mut self,
        source: impl core::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the operation that produced this error.
    #[must_use]
    pub fn op(&self) -> &str {
        &self.op
    }

    /// Returns the error classification.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Re-tags the error with the name of an outer operation.
    ///
    /// Used when a public method delegates to internal steps and the caller
    /// should see the public name, e.g. `"add: embedding generation failed"`.
    #[must_use]
    pub fn in_op(mut self, op: impl Into<String>) -> Self {
        self.op = op.into();
        self
    }

    /// True when the id was absent or masked by access control.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.kind, ErrorKind::NotFound)
    }

    /// True when the error came from context cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }

    /// Shorthand for [`ErrorKind::NotFound`].
    pub fn not_found(op: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, op, message)
    }

    /// Shorthand for [`ErrorKind::InvalidConfig`].
    pub fn invalid_config(op: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidConfig, op, message)
    }

    /// Shorthand for [`ErrorKind::ConnectionFailed`].
    pub fn connection_failed(op: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConnectionFailed, op, message)
    }

    /// Shorthand for [`ErrorKind::EmbeddingFailed`].
    pub fn embedding_failed(op: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EmbeddingFailed, op, message)
    }

    /// Shorthand for [`ErrorKind::InvalidInput`].
    pub fn invalid_input(op: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, op, message)
    }

    /// Shorthand for [`ErrorKind::StorageOperation`].
    pub fn storage(op: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StorageOperation, op, message)
    }

    /// Shorthand for [`ErrorKind::LlmOperation`].
    pub fn llm(op: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::LlmOperation, op, message)
    }

    /// Shorthand for [`ErrorKind::Cancelled`].
    pub fn cancelled(op: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, op, "operation cancelled")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_op_and_message() {
        let err = MemoryError::storage("add", "insert failed");
        assert_eq!(err.to_string(), "add: insert failed");
        assert_eq!(err.kind(), ErrorKind::StorageOperation);
    }

    #[test]
    fn in_op_retags() {
        let err = MemoryError::embedding_failed("embed", "dimension mismatch").in_op("add");
        assert_eq!(err.op(), "add");
        assert_eq!(err.kind(), ErrorKind::EmbeddingFailed);
    }

    #[test]
    fn predicates() {
        assert!(MemoryError::not_found("get", "missing").is_not_found());
        assert!(MemoryError::cancelled("search").is_cancelled());
        assert!(!MemoryError::llm("extract", "bad json").is_not_found());
    }

    #[test]
    fn source_is_preserved() {
        let io = std::io::Error::other("boom");
        let err = MemoryError::connection_failed("search", "backend unreachable").with_source(io);
        assert!(core::error::Error::source(&err).is_some());
    }
}
