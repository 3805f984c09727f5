//! Replica store trait definition.
//!
//! [`ReplicaStore`] is the extraction engine contract: create one container
//! per worker shard, then copy filtered rows of remote datasets into it.

use std::path::{Path, PathBuf};

use portalsync_types::CredentialHandle;

use crate::error;

/// A remote dataset reachable through a local credential. Feature dataset
/// grouping is not part of the address; replicas are flat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTable {
    pub credential: CredentialHandle,
    /// Full dataset path, e.g. `GIS.ROADS`.
    pub dataset: String,
}

/// A file-based local data container owned by exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaContainer {
    pub name: String,
    pub path: PathBuf,
}

/// Storage contract for local replicas.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn ReplicaStore>`.
/// Containers are never shared between workers, so implementations need no
/// cross-container locking.
pub trait ReplicaStore: Send + Sync {
    /// Create (or recreate empty) the container `name` under `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicaError`](crate::ReplicaError) if the container cannot
    /// be created.
    fn create_container(&self, dir: &Path, name: &str) -> error::Result<ReplicaContainer>;

    /// Copy the rows of `source` matching `row_filter` into `table` of
    /// `target`, replacing any table of that name. Returns the row count.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicaError`](crate::ReplicaError) on any extraction failure.
    fn extract_rows(
        &self,
        source: &SourceTable,
        target: &ReplicaContainer,
        table: &str,
        row_filter: Option<&str>,
    ) -> error::Result<u64>;
}
