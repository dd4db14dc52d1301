//! Workflow processor. Drives one execution through its node graph.
//!
//! The walk is depth-first over a stack of node indices:
//! 1. Pop a node. Skip it if it already has a job, or if any upstream node
//!    has no `resolved` job yet (join-wait: it is pushed again when its
//!    last upstream completes).
//! 2. Create a `pending` job linked to the latest upstream job.
//! 3. Resolve the node's config against every terminal job result so far.
//! 4. Run the instruction. A completed job pushes its downstream nodes; a
//!    failed one ends the execution; a suspended one parks it.
//!
//! Nothing about the walk lives only in memory. On resume the stack is
//! rebuilt from the persisted jobs: every node without a job whose upstream
//! nodes are all resolved is ready, with the resumed node's downstream
//! nodes visited first.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use nodes::{Deferred, ExecutionContext, Instruction, Job, JobResult, JobStatus, NodeError, Step};
use queue::{ResumeMessage, ResumeSender};

use crate::dag::WorkflowGraph;
use crate::registry::InstructionRegistry;
use crate::resolver::{self, Scope};
use crate::store::JobStore;
use crate::{EngineError, Execution, ExecutionStatus, Workflow};

/// What the walk does after a node has been visited.
enum Flow {
    Continue,
    Halt(ExecutionStatus),
    Suspend { job_id: Uuid, work: Option<Deferred> },
}

impl From<Option<ExecutionStatus>> for Flow {
    fn from(halt: Option<ExecutionStatus>) -> Self {
        halt.map_or(Flow::Continue, Flow::Halt)
    }
}

/// Runs one execution. Build one per `start`/`resume` call; all state that
/// must outlive the call is in the job store.
pub struct Processor<'a> {
    store: &'a dyn JobStore,
    registry: &'a InstructionRegistry,
    resume_tx: &'a ResumeSender,
    graph: WorkflowGraph<'a>,
    execution: Execution,
    /// Jobs of this execution in creation order.
    jobs: Vec<Job>,
}

impl<'a> Processor<'a> {
    /// # Errors
    /// Any DAG validation error for `workflow`.
    pub fn new(
        store: &'a dyn JobStore,
        registry: &'a InstructionRegistry,
        resume_tx: &'a ResumeSender,
        workflow: &'a Workflow,
        execution: Execution,
        jobs: Vec<Job>,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            store,
            registry,
            resume_tx,
            graph: WorkflowGraph::build(workflow)?,
            execution,
            jobs,
        })
    }

    pub fn into_execution(self) -> Execution {
        self.execution
    }

    /// Walk a freshly created execution from its start node.
    #[instrument(skip(self), fields(execution_id = %self.execution.id))]
    pub async fn start(&mut self) -> Result<(), EngineError> {
        self.advance(Vec::new()).await
    }

    /// Apply the external `outcome` to the suspended `job` and continue the
    /// walk from its downstream nodes.
    ///
    /// The caller must already have claimed the execution (moved it from
    /// `suspended` to `running`).
    #[instrument(skip(self, job, outcome), fields(execution_id = %self.execution.id, job_id = %job.id))]
    pub async fn resume(&mut self, job: Job, outcome: JobResult) -> Result<(), EngineError> {
        let index = self.graph.index_of(&job.node_id).ok_or_else(|| {
            EngineError::Corrupt(format!("job {} references unknown node '{}'", job.id, job.node_id))
        })?;
        let node = self.graph.node(index);

        let halt = match self.prepare(index) {
            Err(failure) => self.settle(index, job.id, failure, false).await?,
            Ok((instruction, config)) => {
                let upstream = job
                    .upstream_id
                    .and_then(|id| self.jobs.iter().find(|j| j.id == id).cloned());
                let ctx = self.context(index, job.id, config, upstream);

                let result = match instruction.resume(&ctx, &job, outcome).await {
                    Ok(result) => result,
                    Err(e) => failure_of(&e),
                };
                self.settle(index, job.id, result, node.ignore_fail()).await?
            }
        };

        match halt {
            Some(status) => self.finish(status).await,
            None => {
                let seeds = self.graph.downstream(index).to_vec();
                self.advance(seeds).await
            }
        }
    }

    // -----------------------------------------------------------------------
    // The walk
    // -----------------------------------------------------------------------

    async fn advance(&mut self, seeds: Vec<usize>) -> Result<(), EngineError> {
        let mut stack = self.ready_nodes();
        stack.extend(seeds.into_iter().rev());

        while let Some(index) = stack.pop() {
            if self.job_of(index).is_some() {
                continue;
            }
            if !self.is_ready(index) {
                debug!("node '{}' waiting for upstream branches", self.graph.node(index).id);
                continue;
            }

            match self.run_node(index).await? {
                Flow::Continue => stack.extend(self.graph.downstream(index).iter().rev()),
                Flow::Halt(status) => return self.finish(status).await,
                Flow::Suspend { job_id, work } => return self.suspend(job_id, work).await,
            }
        }

        self.finish(ExecutionStatus::Resolved).await
    }

    /// Nodes without a job whose upstream nodes are all resolved, with the
    /// first-declared node on top of the returned stack.
    fn ready_nodes(&self) -> Vec<usize> {
        (0..self.graph.len())
            .rev()
            .filter(|&i| self.job_of(i).is_none() && self.is_ready(i))
            .collect()
    }

    fn is_ready(&self, index: usize) -> bool {
        self.graph.upstream(index).iter().all(|&up| {
            self.job_of(up)
                .is_some_and(|job| job.status == JobStatus::Resolved)
        })
    }

    fn job_of(&self, index: usize) -> Option<&Job> {
        let node_id = &self.graph.node(index).id;
        self.jobs.iter().find(|job| &job.node_id == node_id)
    }

    /// The most recently created job among the node's upstream nodes.
    fn latest_upstream_job(&self, index: usize) -> Option<Job> {
        let upstream: Vec<&str> = self
            .graph
            .upstream(index)
            .iter()
            .map(|&up| self.graph.node(up).id.as_str())
            .collect();
        self.jobs
            .iter()
            .rev()
            .find(|job| upstream.contains(&job.node_id.as_str()))
            .cloned()
    }

    async fn run_node(&mut self, index: usize) -> Result<Flow, EngineError> {
        let node = self.graph.node(index);
        let upstream = self.latest_upstream_job(index);

        let job = self
            .store
            .create_job(
                self.execution.id,
                &node.id,
                upstream.as_ref().map(|job| job.id),
                JobStatus::Pending,
            )
            .await?;
        debug!("job {} created for node '{}'", job.id, node.id);
        let job_id = job.id;
        self.jobs.push(job);

        let (instruction, config) = match self.prepare(index) {
            Ok(prepared) => prepared,
            Err(failure) => return Ok(self.settle(index, job_id, failure, false).await?.into()),
        };
        let ctx = self.context(index, job_id, config, upstream);

        let result = match instruction.run(&ctx).await {
            Ok(Step::Complete(result)) => result,
            Ok(Step::Suspend(_)) if self.graph.workflow().sync => JobResult::error(json!({
                "error": "instruction suspended in a synchronous workflow",
            })),
            Ok(Step::Suspend(work)) => return Ok(Flow::Suspend { job_id, work }),
            Err(e) => failure_of(&e),
        };

        Ok(self.settle(index, job_id, result, node.ignore_fail()).await?.into())
    }

    /// Look up the node's instruction and resolve its config.
    ///
    /// A failure here is a configuration error, returned as the `failed`
    /// outcome to record on the job.
    fn prepare(&self, index: usize) -> Result<(Arc<dyn Instruction>, Value), JobResult> {
        let node = self.graph.node(index);
        let configuration_error = |e: EngineError| {
            warn!("node '{}' configuration error: {}", node.id, e);
            JobResult::failed(json!({ "error": e.to_string() }))
        };

        let instruction = self.registry.lookup(&node.instruction).map_err(configuration_error)?;
        let scope = Scope::new(&self.jobs, &self.execution.context);
        let config = resolver::resolve(&node.config, &scope).map_err(configuration_error)?;
        Ok((instruction, config))
    }

    fn context(&self, index: usize, job_id: Uuid, config: Value, upstream: Option<Job>) -> ExecutionContext {
        let workflow = self.graph.workflow();
        ExecutionContext {
            workflow_id: workflow.id,
            execution_id: self.execution.id,
            job_id,
            node_id: self.graph.node(index).id.clone(),
            sync: workflow.sync,
            config,
            trigger: self.execution.context.clone(),
            upstream,
        }
    }

    /// Record a terminal outcome on a pending job.
    ///
    /// Returns the execution status to halt with, or `None` to keep walking.
    /// With `ignore_fail` a failed or errored job is stored as `resolved`
    /// and its result keeps the failure detail.
    async fn settle(
        &mut self,
        index: usize,
        job_id: Uuid,
        outcome: JobResult,
        ignore_fail: bool,
    ) -> Result<Option<ExecutionStatus>, EngineError> {
        let node_id = &self.graph.node(index).id;
        let JobResult { mut status, mut result } = outcome;

        if status == JobStatus::Pending {
            status = JobStatus::Error;
            result = json!({ "error": "instruction completed without a terminal status", "result": result });
        }
        if ignore_fail && matches!(status, JobStatus::Failed | JobStatus::Error) {
            info!("node '{}' {} but ignoreFail is set; continuing", node_id, status);
            status = JobStatus::Resolved;
        }

        if !self.store.update_job(job_id, status, &result).await? {
            return Err(EngineError::InvalidResume {
                job_id,
                reason: "job is no longer pending".into(),
            });
        }
        if let Some(job) = self.jobs.iter_mut().find(|job| job.id == job_id) {
            job.status = status;
            job.result = result;
        }

        match status {
            JobStatus::Resolved => {
                info!("node '{}' resolved", node_id);
                Ok(None)
            }
            JobStatus::Failed => {
                error!("node '{}' failed", node_id);
                Ok(Some(ExecutionStatus::Failed))
            }
            JobStatus::Error | JobStatus::Pending => {
                error!("node '{}' errored", node_id);
                Ok(Some(ExecutionStatus::Error))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Leaving the walk
    // -----------------------------------------------------------------------

    async fn suspend(&mut self, job_id: Uuid, work: Option<Deferred>) -> Result<(), EngineError> {
        let id = self.execution.id;
        if !self
            .store
            .transition_execution(id, ExecutionStatus::Running, ExecutionStatus::Suspended)
            .await?
        {
            return Err(EngineError::Corrupt(format!("execution {id} left the running state while advancing")));
        }
        self.execution = self.store.get_execution(id).await?;
        info!("execution {} suspended on job {}", id, job_id);

        // Released only now that the suspension is durable, so the outcome
        // can never race ahead of it.
        if let Some(work) = work {
            let tx = self.resume_tx.clone();
            tokio::spawn(async move {
                let outcome = work.await;
                if let Err(e) = tx.send(ResumeMessage { job_id, outcome }).await {
                    error!("could not deliver outcome of job {}: {}", job_id, e);
                }
            });
        }
        Ok(())
    }

    async fn finish(&mut self, status: ExecutionStatus) -> Result<(), EngineError> {
        let id = self.execution.id;
        if !self
            .store
            .transition_execution(id, ExecutionStatus::Running, status)
            .await?
        {
            return Err(EngineError::Corrupt(format!("execution {id} left the running state while advancing")));
        }
        self.execution = self.store.get_execution(id).await?;
        info!("execution {} finished: {}", id, status);
        Ok(())
    }
}

/// Job outcome recorded for an instruction error.
fn failure_of(e: &NodeError) -> JobResult {
    JobResult {
        status: e.job_status(),
        result: json!({ "error": e.to_string() }),
    }
}
