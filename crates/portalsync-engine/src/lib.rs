//! Partitioned data migration and publish pipeline.
//!
//! For each service: extract remote layer data into local replica
//! containers, rewire a working copy of the project onto them, then stage
//! and publish the packaged artifact to a portal.

#![warn(clippy::pedantic)]

pub mod artifact;
pub mod batch;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod extraction;
pub mod orchestrator;
pub mod partition;
pub(crate) mod pool;
pub mod portal;
pub mod project;
pub mod publish;
pub mod registry;
pub mod report;
pub mod result;
pub mod retry;
pub mod rewiring;
pub mod workspace;

// Re-export public API for convenience
pub use batch::{local_collaborators, run_batch};
pub use errors::{BatchError, ServiceError};
pub use orchestrator::{Collaborators, OrchestratorSettings, ServicePhase, ServicePublishOrchestrator};
pub use registry::{ConnectionRegistry, RegistryEntry};
pub use result::{PipelineResult, PoolReport, WorkerReport};
pub use retry::{RetryError, RetryPolicy};
