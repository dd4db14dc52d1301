//! Instruction-level error type.

use thiserror::Error;

use crate::JobStatus;

/// Errors returned by an instruction's `run` or `resume`.
///
/// The engine never retries. The variant only decides how the job is
/// recorded:
/// - `InvalidConfig`: configuration problem, job is `failed`.
/// - `Runtime`: uncaught failure, job is `error`.
/// - `ResumeUnsupported`: `resume` called on an instruction that never
///   suspends, job is `error`.
#[derive(Debug, Error, Clone)]
pub enum NodeError {
    #[error("invalid node config: {0}")]
    InvalidConfig(String),

    #[error("instruction failed: {0}")]
    Runtime(String),

    #[error("instruction does not support resume")]
    ResumeUnsupported,
}

impl NodeError {
    /// Job status this error is recorded with.
    pub fn job_status(&self) -> JobStatus {
        match self {
            Self::InvalidConfig(_) => JobStatus::Failed,
            Self::Runtime(_) | Self::ResumeUnsupported => JobStatus::Error,
        }
    }
}
