//! Shared portalsync data model.
//!
//! Layers, typed connection descriptors, credential handles, and service run
//! bookkeeping. Kept free of I/O so the replica store, the engine and the CLI
//! can all depend on it.

#![warn(clippy::pedantic)]

pub mod credential;
pub mod descriptor;
pub mod layer;
pub mod service;

pub use credential::CredentialHandle;
pub use descriptor::{ConnectionDescriptor, DescriptorError, LocalDescriptor, RemoteDescriptor};
pub use layer::{Layer, LayerId, SkipReason};
pub use service::{ActiveRun, ResultCode, ServiceKind, ServiceRun};
