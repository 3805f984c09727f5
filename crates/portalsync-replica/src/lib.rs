//! Local replica storage for portalsync.
//!
//! Provides the [`ReplicaStore`] trait the extraction workers write through
//! and a [`SqliteReplicaStore`] implementation where both the credentialed
//! sources and the per-shard replica containers are `SQLite` files.

#![warn(clippy::pedantic)]

pub mod error;
pub mod sqlite;
pub mod store;

pub use error::ReplicaError;
pub use sqlite::SqliteReplicaStore;
pub use store::{ReplicaContainer, ReplicaStore, SourceTable};
