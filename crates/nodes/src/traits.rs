//! The `Instruction` trait, the contract every node type must fulfil.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::{Job, JobResult, NodeError};

/// What the engine hands an instruction when it runs or resumes a node.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// ID of the parent workflow.
    pub workflow_id: Uuid,
    /// ID of the current execution run.
    pub execution_id: Uuid,
    /// The job created for this node (still `pending` while `run` executes).
    pub job_id: Uuid,
    /// ID of the node being executed.
    pub node_id: String,
    /// Whether the workflow must complete without suspending.
    pub sync: bool,
    /// Node configuration with every variable reference already resolved.
    pub config: Value,
    /// Payload of the event that triggered the execution.
    pub trigger: Value,
    /// Job of the node this one was reached from; `None` at the start node.
    pub upstream: Option<Job>,
}

/// External work scheduled by a suspending instruction.
///
/// The engine spawns it only after the suspension is durable, then feeds
/// the outcome back through the resume queue.
pub type Deferred = Pin<Box<dyn Future<Output = JobResult> + Send + 'static>>;

/// What `run` tells the engine to do next.
pub enum Step {
    /// The node finished; record the result and keep walking.
    Complete(JobResult),
    /// No further progress now. The job stays `pending` until `resume`.
    ///
    /// With `Some(work)` the engine delivers the work's outcome itself; with
    /// `None` an external caller is expected to resume the job.
    Suspend(Option<Deferred>),
}

impl Step {
    /// Suspend until an external caller resumes the job.
    pub fn suspend() -> Self {
        Self::Suspend(None)
    }

    /// Suspend and let the engine resume the job with `work`'s outcome.
    pub fn defer<F>(work: F) -> Self
    where
        F: Future<Output = JobResult> + Send + 'static,
    {
        Self::Suspend(Some(Box::pin(work)))
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete(result) => f.debug_tuple("Complete").field(result).finish(),
            Self::Suspend(work) => f
                .debug_struct("Suspend")
                .field("deferred", &work.is_some())
                .finish(),
        }
    }
}

/// The core instruction trait.
///
/// `run` is called exactly once per job. Only instructions that can suspend
/// implement `resume`; it is called exactly once, with the outcome of the
/// external event the suspended job was waiting for.
#[async_trait]
pub trait Instruction: Send + Sync {
    async fn run(&self, ctx: &ExecutionContext) -> Result<Step, NodeError>;

    async fn resume(
        &self,
        _ctx: &ExecutionContext,
        _job: &Job,
        _outcome: JobResult,
    ) -> Result<JobResult, NodeError> {
        Err(NodeError::ResumeUnsupported)
    }
}
