//! Typed connection descriptors and the data-source string parser.
//!
//! A project stores each layer's binding as a free-form `KEY=value,KEY=value`
//! string. [`ConnectionDescriptor::parse`] turns that into either a
//! [`RemoteDescriptor`] (enterprise database binding) or a
//! [`LocalDescriptor`] (file-based replica binding), rejecting strings that
//! lack the fields the pipeline depends on.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const KEY_USER: &str = "USER";
const KEY_SERVER: &str = "SERVER";
const KEY_INSTANCE: &str = "INSTANCE";
const KEY_DATASET: &str = "DATASET";
const KEY_FEATURE_DATASET: &str = "FEATURE DATASET";
const KEY_DATABASE: &str = "DATABASE";

/// Failure to interpret a data-source string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    #[error("malformed descriptor: empty data source")]
    Empty,
    #[error("malformed descriptor: segment '{0}' is not KEY=value")]
    BadSegment(String),
    #[error("malformed descriptor: missing required field {0}")]
    MissingField(&'static str),
    #[error("malformed descriptor: field {0} given more than once")]
    DuplicateField(String),
}

/// Binding to a dataset inside a remote enterprise database.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteDescriptor {
    /// Owning database account. `None` when the source carries no user
    /// (such layers cannot be localized).
    pub account: Option<String>,
    pub server: Option<String>,
    pub instance: Option<String>,
    /// Full dataset path, e.g. `GIS.ROADS`.
    pub dataset: String,
    pub feature_dataset: Option<String>,
}

impl RemoteDescriptor {
    /// Leaf table name of the dataset (`GIS.ROADS` -> `ROADS`).
    #[must_use]
    pub fn leaf_name(&self) -> &str {
        dataset_leaf(&self.dataset)
    }

    /// Whether the descriptor names a server or an instance.
    #[must_use]
    pub fn has_server_identity(&self) -> bool {
        self.server.as_deref().is_some_and(|s| !s.is_empty())
            || self.instance.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// Binding to a table inside a local replica container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalDescriptor {
    pub database: PathBuf,
    pub dataset: String,
}

/// A layer's data-source binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ConnectionDescriptor {
    Remote(RemoteDescriptor),
    Local(LocalDescriptor),
}

impl ConnectionDescriptor {
    /// Parse a `KEY=value,KEY=value` data-source string.
    ///
    /// Keys are case-insensitive. A string carrying `DATABASE` and no
    /// `USER`/`SERVER`/`INSTANCE` is a local binding; anything else is remote.
    /// Both forms require `DATASET`.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError`] when the string is empty, a segment has no
    /// `=`, a key repeats, or `DATASET` (or `DATABASE` for local) is absent.
    pub fn parse(source: &str) -> Result<Self, DescriptorError> {
        let fields = split_fields(source)?;
        let get = |key: &str| fields.get(key).filter(|v| !v.is_empty()).cloned();

        let dataset = get(KEY_DATASET).ok_or(DescriptorError::MissingField(KEY_DATASET))?;
        let remote_keys = [KEY_USER, KEY_SERVER, KEY_INSTANCE];
        let is_local =
            fields.contains_key(KEY_DATABASE) && !remote_keys.iter().any(|k| fields.contains_key(*k));

        if is_local {
            let database = get(KEY_DATABASE).ok_or(DescriptorError::MissingField(KEY_DATABASE))?;
            return Ok(Self::Local(LocalDescriptor {
                database: PathBuf::from(database),
                dataset,
            }));
        }

        Ok(Self::Remote(RemoteDescriptor {
            account: get(KEY_USER),
            server: get(KEY_SERVER),
            instance: get(KEY_INSTANCE),
            dataset,
            feature_dataset: get(KEY_FEATURE_DATASET),
        }))
    }

    /// Resolved dataset name: the leaf table name the binding points at.
    #[must_use]
    pub fn dataset_name(&self) -> &str {
        match self {
            Self::Remote(r) => r.leaf_name(),
            Self::Local(l) => dataset_leaf(&l.dataset),
        }
    }

    #[must_use]
    pub fn as_remote(&self) -> Option<&RemoteDescriptor> {
        match self {
            Self::Remote(r) => Some(r),
            Self::Local(_) => None,
        }
    }
}

/// Leaf name of a dataset path: strips any `\`-delimited prefix, then keeps
/// the last `.`-separated segment.
#[must_use]
pub fn dataset_leaf(dataset: &str) -> &str {
    let tail = dataset.rsplit('\\').next().unwrap_or(dataset);
    tail.rsplit('.').next().unwrap_or(tail)
}

fn split_fields(source: &str) -> Result<BTreeMap<String, String>, DescriptorError> {
    if source.trim().is_empty() {
        return Err(DescriptorError::Empty);
    }
    let mut fields = BTreeMap::new();
    for segment in source.split(',') {
        if segment.trim().is_empty() {
            continue;
        }
        let (key, value) = segment
            .split_once('=')
            .ok_or_else(|| DescriptorError::BadSegment(segment.trim().to_string()))?;
        let key = key.trim().to_ascii_uppercase();
        if fields.insert(key.clone(), value.trim().to_string()).is_some() {
            return Err(DescriptorError::DuplicateField(key));
        }
    }
    Ok(fields)
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(r) => {
                let mut parts = Vec::with_capacity(5);
                if let Some(server) = &r.server {
                    parts.push(format!("{KEY_SERVER}={server}"));
                }
                if let Some(instance) = &r.instance {
                    parts.push(format!("{KEY_INSTANCE}={instance}"));
                }
                if let Some(account) = &r.account {
                    parts.push(format!("{KEY_USER}={account}"));
                }
                if let Some(fd) = &r.feature_dataset {
                    parts.push(format!("{KEY_FEATURE_DATASET}={fd}"));
                }
                parts.push(format!("{KEY_DATASET}={}", r.dataset));
                f.write_str(&parts.join(","))
            }
            Self::Local(l) => write!(
                f,
                "{KEY_DATABASE}={},{KEY_DATASET}={}",
                l.database.display(),
                l.dataset
            ),
        }
    }
}

impl FromStr for ConnectionDescriptor {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ConnectionDescriptor {
    type Error = DescriptorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ConnectionDescriptor> for String {
    fn from(value: ConnectionDescriptor) -> Self {
        value.to_string()
    }
}
