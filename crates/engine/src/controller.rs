//! Execution controller: the public entry points of the engine.
//!
//! The controller owns no execution state. Each call loads what it needs
//! from the [`JobStore`], runs a [`Processor`] to the next stopping point
//! and returns. The `suspended` to `running` compare-and-swap in
//! [`ExecutionController::resume`] is what keeps two resumes of the same
//! execution from advancing it twice.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use nodes::{Job, JobResult};
use queue::{HandlerError, ResumeHandler, ResumeMessage, ResumeSender};

use crate::dag::validate_dag;
use crate::processor::Processor;
use crate::registry::InstructionRegistry;
use crate::store::JobStore;
use crate::{EngineError, Execution, ExecutionStatus, Workflow};

#[derive(Clone)]
pub struct ExecutionController {
    store: Arc<dyn JobStore>,
    registry: Arc<InstructionRegistry>,
    resume_tx: ResumeSender,
}

impl ExecutionController {
    /// `resume_tx` receives the outcomes of deferred instruction work; run
    /// a [`queue::run_worker`] with this controller as handler on the other
    /// end.
    pub fn new(store: Arc<dyn JobStore>, registry: Arc<InstructionRegistry>, resume_tx: ResumeSender) -> Self {
        Self { store, registry, resume_tx }
    }

    pub fn store(&self) -> &dyn JobStore {
        self.store.as_ref()
    }

    /// Publish `workflow` (if not already published) and run a new execution
    /// of it until it finishes or suspends.
    ///
    /// The execution is pinned to the stored definition of the workflow id.
    ///
    /// # Errors
    /// DAG validation errors before anything is persisted, or store errors.
    #[instrument(skip(self, workflow, context), fields(workflow_id = %workflow.id))]
    pub async fn start(&self, workflow: &Workflow, context: Value) -> Result<Execution, EngineError> {
        let order = validate_dag(workflow)?;
        info!("DAG validated: {} nodes in order {:?}", order.len(), order);

        self.store.save_workflow(workflow).await?;
        let published = self.store.load_workflow(workflow.id).await?;
        if published != *workflow {
            warn!(
                "workflow {} is already published with a different definition; running the published one",
                workflow.id
            );
        }
        self.run_new(&published, context).await
    }

    /// Run a new execution of an already published workflow.
    #[instrument(skip(self, context))]
    pub async fn start_by_id(&self, workflow_id: Uuid, context: Value) -> Result<Execution, EngineError> {
        let workflow = self.store.load_workflow(workflow_id).await?;
        validate_dag(&workflow)?;
        self.run_new(&workflow, context).await
    }

    async fn run_new(&self, workflow: &Workflow, context: Value) -> Result<Execution, EngineError> {
        let execution = self.store.create_execution(workflow.id, &context).await?;
        info!("execution {} of workflow '{}' started", execution.id, workflow.name);

        let execution_id = execution.id;
        let walked = match Processor::new(
            self.store.as_ref(),
            &self.registry,
            &self.resume_tx,
            workflow,
            execution,
            Vec::new(),
        ) {
            Ok(mut processor) => processor.start().await.map(|()| processor.into_execution()),
            Err(e) => Err(e),
        };
        match walked {
            Ok(execution) => Ok(execution),
            Err(e) => Err(self.abandon(execution_id, e).await),
        }
    }

    /// Mark an execution whose walk broke off as `error` and hand back the
    /// cause. The write is best-effort; the cause is what the caller sees.
    async fn abandon(&self, execution_id: Uuid, cause: EngineError) -> EngineError {
        error!("execution {} stopped advancing: {}", execution_id, cause);
        match self
            .store
            .transition_execution(execution_id, ExecutionStatus::Running, ExecutionStatus::Error)
            .await
        {
            Ok(true) => info!("execution {} finished: {}", execution_id, ExecutionStatus::Error),
            Ok(false) => warn!("execution {} had already left the running state", execution_id),
            Err(e) => error!("could not mark execution {} as errored: {}", execution_id, e),
        }
        cause
    }

    /// Deliver the external outcome of a suspended job and continue its
    /// execution until it finishes or suspends again.
    ///
    /// # Errors
    /// - [`EngineError::JobNotFound`] for an unknown job id.
    /// - [`EngineError::InvalidResume`] when the job is no longer pending or
    ///   its execution is not suspended. Nothing is changed in that case.
    #[instrument(skip(self, outcome))]
    pub async fn resume(&self, job_id: Uuid, outcome: JobResult) -> Result<Execution, EngineError> {
        match self.try_resume(job_id, outcome).await {
            Err(e @ EngineError::InvalidResume { .. }) => {
                warn!("{}", e);
                Err(e)
            }
            other => other,
        }
    }

    async fn try_resume(&self, job_id: Uuid, outcome: JobResult) -> Result<Execution, EngineError> {
        let job = match self.store.find_pending_job(job_id).await {
            Ok(job) => job,
            Err(EngineError::JobNotFound(_)) => {
                let job = self.store.get_job(job_id).await?;
                return Err(EngineError::InvalidResume {
                    job_id,
                    reason: format!("job is already {}", job.status),
                });
            }
            Err(e) => return Err(e),
        };

        let mut execution = self.store.get_execution(job.execution_id).await?;
        if execution.status != ExecutionStatus::Suspended {
            return Err(EngineError::InvalidResume {
                job_id,
                reason: format!("execution {} is {}", execution.id, execution.status),
            });
        }
        if !self
            .store
            .transition_execution(execution.id, ExecutionStatus::Suspended, ExecutionStatus::Running)
            .await?
        {
            return Err(EngineError::InvalidResume {
                job_id,
                reason: format!("execution {} was claimed by another resume", execution.id),
            });
        }
        // Between the lookup and the claim another resume may have settled
        // this job and suspended the execution again on a later one.
        if let Err(e) = self.store.find_pending_job(job_id).await {
            self.store
                .transition_execution(execution.id, ExecutionStatus::Running, ExecutionStatus::Suspended)
                .await?;
            return match e {
                EngineError::JobNotFound(_) => Err(EngineError::InvalidResume {
                    job_id,
                    reason: "job was settled by another resume".into(),
                }),
                other => Err(other),
            };
        }
        execution.status = ExecutionStatus::Running;
        info!("execution {} resumed by job {}", execution.id, job_id);

        let execution_id = execution.id;
        match self.continue_walk(execution, job, outcome).await {
            Ok(execution) => Ok(execution),
            Err(e) => Err(self.abandon(execution_id, e).await),
        }
    }

    /// Rebuild the walk of a claimed execution and apply `outcome` to `job`.
    async fn continue_walk(&self, execution: Execution, job: Job, outcome: JobResult) -> Result<Execution, EngineError> {
        let workflow = self.store.load_workflow(execution.workflow_id).await?;
        let jobs = self.store.list_jobs(execution.id).await?;
        let mut processor = Processor::new(
            self.store.as_ref(),
            &self.registry,
            &self.resume_tx,
            &workflow,
            execution,
            jobs,
        )?;
        processor.resume(job, outcome).await?;
        Ok(processor.into_execution())
    }

    /// Abort a suspended execution. Its pending job stays pending and any
    /// later resume of it is rejected.
    ///
    /// # Errors
    /// [`EngineError::InvalidAbort`] unless the execution is suspended.
    #[instrument(skip(self))]
    pub async fn abort(&self, execution_id: Uuid) -> Result<Execution, EngineError> {
        let execution = self.store.get_execution(execution_id).await?;
        if !self
            .store
            .transition_execution(execution_id, ExecutionStatus::Suspended, ExecutionStatus::Aborted)
            .await?
        {
            let current = self.store.get_execution(execution_id).await.unwrap_or(execution);
            return Err(EngineError::InvalidAbort {
                execution_id,
                status: current.status.to_string(),
            });
        }
        info!("execution {} aborted", execution_id);
        self.store.get_execution(execution_id).await
    }

    /// The execution and its jobs in creation order.
    pub async fn inspect(&self, execution_id: Uuid) -> Result<(Execution, Vec<Job>), EngineError> {
        let execution = self.store.get_execution(execution_id).await?;
        let jobs = self.store.list_jobs(execution_id).await?;
        Ok((execution, jobs))
    }
}

impl std::fmt::Debug for ExecutionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionController")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ResumeHandler for ExecutionController {
    async fn handle(&self, message: ResumeMessage) -> Result<(), HandlerError> {
        self.resume(message.job_id, message.outcome).await?;
        Ok(())
    }
}
