//! Error types shared across the pipeline
//!
//! Every fallible operation in the workspace converges on [`Error`].
//! Component crates define their own narrower enums (`LlmError`, `RagError`)
//! and convert at the crate boundary.

use thiserror::Error;

/// Unified pipeline error
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or rejected input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Entity, model or resource absent
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    /// Uniqueness or state conflict
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Deadline expired on an outbound call
    #[error("Timeout: {0}")]
    Timeout(String),

    /// External service failed
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Embedding output failed validation
    #[error("Invalid embedding: {0}")]
    EmbeddingInvalid(String),

    /// Post-write reindex failed; the write itself committed
    #[error("Index stale for {kind} {id}: {reason}")]
    IndexStale {
        kind: String,
        id: String,
        reason: String,
    },

    /// Unclassified internal failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a not-found error
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Canonical user-facing message for errors with a fixed template.
    ///
    /// `Upstream` and `Timeout` are rendered by the generator instead, so
    /// this returns `None` for those.
    pub fn canned_message(&self) -> Option<String> {
        match self {
            Error::Validation(msg) => Some(format!("That request looks invalid: {}.", msg)),
            Error::NotFound { kind, id } => {
                Some(format!("I couldn't find a {} matching \"{}\".", kind, id))
            }
            Error::Conflict(msg) => Some(format!("That conflicts with existing data: {}.", msg)),
            _ => None,
        }
    }
}

/// Workspace result alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canned_messages() {
        let err = Error::not_found("user", "Youssef");
        assert!(err.canned_message().unwrap().contains("Youssef"));

        let err = Error::Upstream("connection refused".into());
        assert!(err.canned_message().is_none());
    }

    #[test]
    fn test_display() {
        let err = Error::IndexStale {
            kind: "task".into(),
            id: "K1".into(),
            reason: "embedding failed".into(),
        };
        let text = err.to_string();
        assert!(text.contains("task"));
        assert!(text.contains("K1"));
    }
}
