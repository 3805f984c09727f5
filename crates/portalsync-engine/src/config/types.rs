//! Deployment and service definition types.
//!
//! A batch is driven by one deployment file (portal labels, worker counts,
//! retry policy, credential rules, notification recipients) and one service
//! definition file per service under the target's `list/` directory.

use std::path::PathBuf;
use std::time::Duration;

use portalsync_types::ServiceKind;
use serde::{Deserialize, Serialize};

use crate::credentials::CredentialRule;
use crate::partition::default_worker_count;
use crate::retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY_SECS};

/// Top-level deployment configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentConfig {
    pub version: String,
    #[serde(default)]
    pub portal: PortalLabels,
    /// Rebuild local replicas and working copies before publishing.
    #[serde(default = "default_true")]
    pub rebuild_data: bool,
    #[serde(default)]
    pub resources: ResourceConfig,
    pub credentials: CredentialConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

fn default_true() -> bool {
    true
}

/// Labels used in notifications, plus the local catalogue location.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PortalLabels {
    /// Defaults to the target directory's parent name.
    #[serde(default)]
    pub name: Option<String>,
    /// Defaults to the target directory name.
    #[serde(default)]
    pub folder: Option<String>,
    /// Catalogue file for the file-backed portal. Defaults to `<target>/portal.json`.
    #[serde(default)]
    pub catalogue: Option<PathBuf>,
}

/// Worker and retry tuning.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceConfig {
    #[serde(default)]
    pub parallelism: Parallelism,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Worker count for both pools: `auto` or a fixed number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "ParallelismValue")]
pub enum Parallelism {
    #[default]
    Auto,
    Manual(u32),
}

impl Parallelism {
    /// Worker count for both pools. `auto` is half the available cores.
    #[must_use]
    pub fn worker_count(self) -> usize {
        match self {
            Self::Auto => default_worker_count(),
            Self::Manual(n) => usize::try_from(n).unwrap_or(usize::MAX).max(1),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ParallelismValue {
    Count(u32),
    Keyword(String),
}

impl TryFrom<ParallelismValue> for Parallelism {
    type Error = String;

    fn try_from(value: ParallelismValue) -> Result<Self, Self::Error> {
        match value {
            ParallelismValue::Count(n) => Ok(Self::Manual(n)),
            ParallelismValue::Keyword(s) if s.eq_ignore_ascii_case("auto") => Ok(Self::Auto),
            ParallelismValue::Keyword(s) => Err(format!(
                "invalid parallelism '{s}', expected 'auto' or a positive integer"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_delay_seconds")]
    pub delay_seconds: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_delay_seconds() -> u64 {
    DEFAULT_RETRY_DELAY_SECS
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay_seconds: DEFAULT_RETRY_DELAY_SECS,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_secs(self.delay_seconds))
    }
}

/// Where credential handles live and how descriptors map onto them.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialConfig {
    pub directory: PathBuf,
    #[serde(default)]
    pub rules: Vec<CredentialRule>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub success_recipients: Vec<String>,
    #[serde(default)]
    pub failure_recipients: Vec<String>,
}

/// Who a published service is shared with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharingSettings {
    #[serde(default)]
    pub everyone: bool,
    #[serde(default)]
    pub org: bool,
    #[serde(default)]
    pub groups: Vec<String>,
}

/// One service definition file.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceDefinition {
    pub service_name: String,
    pub service_kind: ServiceKind,
    /// Live service to overwrite. When absent the service is matched by title.
    #[serde(default)]
    pub service_id: Option<String>,
    #[serde(default)]
    pub folder: Option<String>,
    /// Source project. Never modified; rewiring works on a copy.
    pub project: PathBuf,
    /// Comma-separated tag list.
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub allow_exporting: bool,
    #[serde(default)]
    pub sharing: SharingSettings,
    pub portal_url: String,
    pub admin_user: String,
    #[serde(default)]
    pub admin_password: String,
    /// Tile packages only.
    #[serde(default)]
    pub max_cached_scale: Option<f64>,
}

impl ServiceDefinition {
    /// Full portal endpoint for `portal_url`.
    ///
    /// Hosted online organisations are addressed directly; on-premises
    /// portals live under the `/portal` web adaptor.
    #[must_use]
    pub fn portal_endpoint(&self) -> String {
        let url = self
            .portal_url
            .trim()
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');
        if url.contains("arcgis") || url.ends_with("/portal") {
            format!("https://{url}")
        } else {
            format!("https://{url}/portal")
        }
    }

    /// Title of the temporary item a tile publish may leave behind.
    #[must_use]
    pub fn temporary_title(&self) -> String {
        let prefix: String = self.service_name.chars().take(12).collect();
        format!("temp_{prefix}")
    }
}
