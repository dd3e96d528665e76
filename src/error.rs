//! Error taxonomy for the indexing and search pipelines.
//!
//! Every pipeline stage either completes fully or returns one of these
//! variants. The top-level entry points in [`crate::indexer`] and
//! [`crate::search`] convert them into structured outcome values so that
//! errors never cross the external interface boundary as panics.

use thiserror::Error;

/// Errors raised by the indexing and search pipelines.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed repository or index configuration. Raised before any I/O.
    #[error("invalid configuration: {0}")]
    Validation(String),

    /// Clone failure or unreadable local repository path.
    #[error("repository acquisition failed: {0}")]
    Acquisition(String),

    /// Failure from the embedding backend. Fatal to the current operation;
    /// no partial index is persisted.
    #[error("embedding request failed: {0}")]
    Embedding(String),

    /// Missing or corrupt on-disk artifact during load, or a failed write
    /// during save.
    #[error("index persistence failed: {0}")]
    Persistence(String),

    /// Search or delete against a repository name with no existing index.
    #[error("no index found for repository '{0}'")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;
