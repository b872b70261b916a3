//! Error types surfaced by the digest pipeline.
//!
//! Discarded noise and classification misses are not errors: they show up
//! as filtered-out items or `None`. What remains is storage failure and the
//! recoverable failures the pipeline turns into fallbacks.

use thiserror::Error;

/// Failure reported by a [`DocumentStore`](crate::store::DocumentStore).
#[derive(Error, Debug)]
pub enum StoreError {
    /// The requested document does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The path escapes the store root or is otherwise unusable.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Underlying read/write failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Recoverable pipeline failures.
#[derive(Error, Debug)]
pub enum DigestError {
    /// The AI provider failed or returned text that could not be parsed.
    #[error("AI unavailable: {0}")]
    AiUnavailable(String),

    /// An explicit or inferred merge target does not exist.
    #[error("merge target missing: {0}")]
    MergeTargetMissing(String),

    /// Reading or writing a knowledge file failed.
    #[error("file I/O failed for {path}: {reason}")]
    FileIo { path: String, reason: String },

    /// A category manifest exists but could not be parsed or written.
    #[error("manifest error for {path}: {reason}")]
    Manifest { path: String, reason: String },
}

impl From<StoreError> for DigestError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(path) => DigestError::MergeTargetMissing(path),
            StoreError::InvalidPath(path) => DigestError::FileIo {
                reason: "path could not be resolved".to_string(),
                path,
            },
            StoreError::Io { path, source } => DigestError::FileIo {
                path,
                reason: source.to_string(),
            },
        }
    }
}
