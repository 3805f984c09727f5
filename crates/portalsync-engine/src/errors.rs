//! Service and batch error model.
//!
//! A [`ServiceError`] ends one pass of one service with a hard failure; the
//! batch carries on with the next service. A [`BatchError`] stops the batch
//! before any service runs.

use std::path::PathBuf;

use crate::project::ProjectError;
use crate::retry::RetryError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("cannot prepare {}: {source}", path.display())]
    Prepare {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error(transparent)]
    Publish(#[from] RetryError),

    #[error("publish task failed: {0}")]
    Join(String),
}

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// Missing target, unreadable deployment file, unusable workspace.
    #[error("fatal configuration error: {0:#}")]
    FatalConfiguration(anyhow::Error),
}

impl BatchError {
    pub(crate) fn fatal(message: impl std::fmt::Display) -> Self {
        Self::FatalConfiguration(anyhow::anyhow!("{message}"))
    }
}
