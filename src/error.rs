//! # Errors
//!
//! Every fallible operation in the library returns [`Result`], whose error side is
//! [`RagError`]. Failures are always surfaced to the caller: a failed embed never
//! turns into a zero vector and a broken snapshot never turns into an empty store.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    /// The embedding backend could not be loaded or failed while running.
    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),

    /// A document position past the end of the store was requested.
    #[error("Document index {index} out of range (store holds {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// The persisted snapshot could not be decoded or is internally inconsistent.
    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The backing search structure rejected an operation.
    #[error("Index error: {0}")]
    Index(String),

    /// The text generation endpoint failed. Generation is never retried.
    #[error("Generation unavailable: {0}")]
    GenerationUnavailable(String),

    /// The store could not be serialized into a snapshot.
    #[error("Snapshot encoding failed: {0}")]
    SnapshotEncode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_yaml::Error> for RagError {
    fn from(err: serde_yaml::Error) -> Self {
        RagError::Config(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for RagError {
    fn from(err: bincode::error::EncodeError) -> Self {
        RagError::SnapshotEncode(err.to_string())
    }
}
