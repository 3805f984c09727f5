//! Service kinds and per-service run bookkeeping.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Kind of hosted service a definition publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// Hosted feature service; data is localized then overwritten in place.
    Feature,
    /// Vector tile service; republished from scratch.
    VectorTile,
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Feature => "feature",
            Self::VectorTile => "vector_tile",
        })
    }
}

/// Outcome code of one service pass. Ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCode {
    Success,
    /// A worker shard failed on part of its input; the service still published.
    Partial,
    /// A phase failed outright.
    HardFailure,
}

impl ResultCode {
    /// Numeric form (0, 1, 2) used in logs.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Partial => 1,
            Self::HardFailure => 2,
        }
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    /// `>= 2`: a hard error rather than a benign partial skip.
    #[must_use]
    pub fn is_hard_failure(self) -> bool {
        self.as_i32() >= 2
    }

    /// Combine two codes, keeping the more severe.
    #[must_use]
    pub fn worst(self, other: Self) -> Self {
        self.max(other)
    }
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_i32())
    }
}

/// A service run in progress. Consumed by [`ActiveRun::finish`], so a run's
/// result is recorded exactly once.
#[derive(Debug)]
pub struct ActiveRun {
    name: String,
    kind: ServiceKind,
    started: Instant,
}

impl ActiveRun {
    #[must_use]
    pub fn start(name: impl Into<String>, kind: ServiceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            started: Instant::now(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    #[must_use]
    pub fn finish(self, code: ResultCode) -> ServiceRun {
        ServiceRun {
            elapsed: self.started.elapsed(),
            name: self.name,
            kind: self.kind,
            code,
        }
    }
}

/// A finalized service run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRun {
    pub name: String,
    pub kind: ServiceKind,
    pub code: ResultCode,
    pub elapsed: Duration,
}

impl ServiceRun {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.code.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_codes_order_by_severity() {
        assert_eq!(ResultCode::Success.worst(ResultCode::Partial), ResultCode::Partial);
        assert_eq!(
            ResultCode::HardFailure.worst(ResultCode::Partial),
            ResultCode::HardFailure
        );
        assert!(!ResultCode::Partial.is_hard_failure());
        assert!(ResultCode::HardFailure.is_hard_failure());
    }

    #[test]
    fn finish_records_code_and_elapsed() {
        let run = ActiveRun::start("Roads", ServiceKind::Feature).finish(ResultCode::Partial);
        assert_eq!(run.name, "Roads");
        assert_eq!(run.kind, ServiceKind::Feature);
        assert!(!run.succeeded());
    }

    #[test]
    fn service_kind_serde_names() {
        let kind: ServiceKind = serde_json::from_str("\"vector_tile\"").unwrap();
        assert_eq!(kind, ServiceKind::VectorTile);
        assert_eq!(kind.to_string(), "vector_tile");
    }
}
