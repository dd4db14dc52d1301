//! Job records and the results instructions hand back to the engine.
//!
//! Defined here (in the nodes crate) so instructions can read upstream jobs
//! and the engine can persist them without a circular dependency.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Lifecycle of a single job.
///
/// `Pending` is the only non-terminal state. A job leaves it exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Resolved,
    Failed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending  => write!(f, "pending"),
            Self::Resolved => write!(f, "resolved"),
            Self::Failed   => write!(f, "failed"),
            Self::Error    => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending"  => Ok(Self::Pending),
            "resolved" => Ok(Self::Resolved),
            "failed"   => Ok(Self::Failed),
            "error"    => Ok(Self::Error),
            other      => Err(format!("unknown job status: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// JobResult
// ---------------------------------------------------------------------------

/// Terminal outcome produced by `run` or `resume`, or delivered by an
/// external callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub status: JobStatus,
    #[serde(default)]
    pub result: Value,
}

impl JobResult {
    pub fn resolved(result: Value) -> Self {
        Self { status: JobStatus::Resolved, result }
    }

    pub fn failed(result: Value) -> Self {
        Self { status: JobStatus::Failed, result }
    }

    pub fn error(result: Value) -> Self {
        Self { status: JobStatus::Error, result }
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One execution record of one node within one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub node_id: String,
    /// `None` only for the start node.
    pub upstream_id: Option<Uuid>,
    pub status: JobStatus,
    pub result: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_its_text_form() {
        for status in [JobStatus::Pending, JobStatus::Resolved, JobStatus::Failed, JobStatus::Error] {
            assert_eq!(status.to_string().parse::<JobStatus>(), Ok(status));
        }
        assert!("done".parse::<JobStatus>().is_err());
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(JobStatus::Resolved.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Error.is_terminal());
    }

    #[test]
    fn job_result_deserializes_without_result_field() {
        let parsed: JobResult = serde_json::from_str(r#"{"status":"failed"}"#).unwrap();
        assert_eq!(parsed, JobResult::failed(Value::Null));
    }
}
