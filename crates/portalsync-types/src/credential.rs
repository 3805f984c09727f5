//! Credential handle newtype.

use serde::{Deserialize, Serialize};

/// Opaque handle to a pre-provisioned local data-source credential
/// (e.g. `"gisuser.sde"`). Resolved to a concrete connection by the
/// replica store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialHandle(String);

impl CredentialHandle {
    /// Create a new credential handle.
    #[must_use]
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CredentialHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for CredentialHandle {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}
