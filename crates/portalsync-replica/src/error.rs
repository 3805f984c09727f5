//! Replica store error types.

use std::path::PathBuf;

/// Errors produced by [`ReplicaStore`](crate::ReplicaStore) operations.
#[derive(Debug, thiserror::Error)]
pub enum ReplicaError {
    /// Underlying `SQLite` failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// File-system I/O failure (e.g. creating the container directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The credential resolved, but its source database is not on disk.
    #[error("source for credential '{credential}' not found at {}", path.display())]
    MissingSource { credential: String, path: PathBuf },

    /// Extraction was rejected by the source engine.
    #[error("extraction of '{dataset}' failed: {message}")]
    Extraction { dataset: String, message: String },
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, ReplicaError>;
