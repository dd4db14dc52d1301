//! The job store contract the processor persists through, and its
//! implementation on top of the `db` crate.
//!
//! Everything a suspended execution needs to continue lives behind this
//! trait, so any process with access to the same database can resume it.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use db::models::{ExecutionRow, JobRow};
use db::repository::{executions, jobs, workflows};
use db::{DbError, DbPool};
use nodes::{Job, JobStatus};

use crate::{EngineError, Execution, ExecutionStatus, Workflow};

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a workflow definition (insert-once per id).
    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), EngineError>;

    async fn load_workflow(&self, id: Uuid) -> Result<Workflow, EngineError>;

    /// New execution in `running` status.
    async fn create_execution(&self, workflow_id: Uuid, context: &Value) -> Result<Execution, EngineError>;

    async fn get_execution(&self, id: Uuid) -> Result<Execution, EngineError>;

    /// Compare-and-swap the execution status. `false` when the stored status
    /// is not `from`.
    async fn transition_execution(
        &self,
        id: Uuid,
        from: ExecutionStatus,
        to: ExecutionStatus,
    ) -> Result<bool, EngineError>;

    async fn create_job(
        &self,
        execution_id: Uuid,
        node_id: &str,
        upstream_id: Option<Uuid>,
        status: JobStatus,
    ) -> Result<Job, EngineError>;

    /// Move a `pending` job to a terminal status. `false` when the job is no
    /// longer pending.
    async fn update_job(&self, job_id: Uuid, status: JobStatus, result: &Value) -> Result<bool, EngineError>;

    /// # Errors
    /// [`EngineError::JobNotFound`] if the job does not exist or is not pending.
    async fn find_pending_job(&self, job_id: Uuid) -> Result<Job, EngineError>;

    async fn get_job(&self, job_id: Uuid) -> Result<Job, EngineError>;

    /// Jobs of one execution in creation order.
    async fn list_jobs(&self, execution_id: Uuid) -> Result<Vec<Job>, EngineError>;
}

// ---------------------------------------------------------------------------
// Row conversions
// ---------------------------------------------------------------------------

fn job_from_row(row: JobRow) -> Result<Job, EngineError> {
    Ok(Job {
        status: row.status.parse::<JobStatus>().map_err(EngineError::Corrupt)?,
        id: row.id,
        execution_id: row.execution_id,
        node_id: row.node_id,
        upstream_id: row.upstream_id,
        result: row.result.0,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn execution_from_row(row: ExecutionRow) -> Result<Execution, EngineError> {
    Ok(Execution {
        status: row.status.parse::<ExecutionStatus>().map_err(EngineError::Corrupt)?,
        id: row.id,
        workflow_id: row.workflow_id,
        context: row.context.0,
        created_at: row.created_at,
        updated_at: row.updated_at,
        finished_at: row.finished_at,
    })
}

// ---------------------------------------------------------------------------
// DbJobStore
// ---------------------------------------------------------------------------

/// [`JobStore`] backed by the SQLite pool of the `db` crate.
#[derive(Debug, Clone)]
pub struct DbJobStore {
    pool: DbPool,
}

impl DbJobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for DbJobStore {
    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), EngineError> {
        let definition = serde_json::to_value(workflow).map_err(|e| EngineError::Corrupt(e.to_string()))?;
        workflows::save_workflow(&self.pool, workflow.id, &workflow.name, definition).await?;
        Ok(())
    }

    async fn load_workflow(&self, id: Uuid) -> Result<Workflow, EngineError> {
        let row = match workflows::get_workflow(&self.pool, id).await {
            Err(DbError::NotFound) => return Err(EngineError::WorkflowNotFound(id)),
            other => other?,
        };
        serde_json::from_value(row.definition.0).map_err(|e| EngineError::Corrupt(e.to_string()))
    }

    async fn create_execution(&self, workflow_id: Uuid, context: &Value) -> Result<Execution, EngineError> {
        let row = executions::create_execution(
            &self.pool,
            workflow_id,
            &ExecutionStatus::Running.to_string(),
            context.clone(),
        )
        .await?;
        execution_from_row(row)
    }

    async fn get_execution(&self, id: Uuid) -> Result<Execution, EngineError> {
        match executions::get_execution(&self.pool, id).await {
            Err(DbError::NotFound) => Err(EngineError::ExecutionNotFound(id)),
            other => execution_from_row(other?),
        }
    }

    async fn transition_execution(
        &self,
        id: Uuid,
        from: ExecutionStatus,
        to: ExecutionStatus,
    ) -> Result<bool, EngineError> {
        Ok(executions::transition_execution(
            &self.pool,
            id,
            &from.to_string(),
            &to.to_string(),
            to.is_terminal(),
        )
        .await?)
    }

    async fn create_job(
        &self,
        execution_id: Uuid,
        node_id: &str,
        upstream_id: Option<Uuid>,
        status: JobStatus,
    ) -> Result<Job, EngineError> {
        let row = jobs::insert_job(&self.pool, execution_id, node_id, upstream_id, &status.to_string()).await?;
        job_from_row(row)
    }

    async fn update_job(&self, job_id: Uuid, status: JobStatus, result: &Value) -> Result<bool, EngineError> {
        Ok(jobs::update_job(&self.pool, job_id, &status.to_string(), result).await?)
    }

    async fn find_pending_job(&self, job_id: Uuid) -> Result<Job, EngineError> {
        match jobs::find_pending_job(&self.pool, job_id).await {
            Err(DbError::NotFound) => Err(EngineError::JobNotFound(job_id)),
            other => job_from_row(other?),
        }
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Job, EngineError> {
        match jobs::get_job(&self.pool, job_id).await {
            Err(DbError::NotFound) => Err(EngineError::JobNotFound(job_id)),
            other => job_from_row(other?),
        }
    }

    async fn list_jobs(&self, execution_id: Uuid) -> Result<Vec<Job>, EngineError> {
        jobs::list_jobs(&self.pool, execution_id)
            .await?
            .into_iter()
            .map(job_from_row)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn store_survives_reopening_the_database() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("engine.db").display());
        let workflow = Workflow::linear("durable", false, "echo", &["a", "b"]);

        let (execution_id, job_id) = {
            let pool = db::pool::create_pool(&url, 2).await.unwrap();
            db::pool::run_migrations(&pool).await.unwrap();
            let store = DbJobStore::new(pool.clone());

            store.save_workflow(&workflow).await.unwrap();
            let exec = store.create_execution(workflow.id, &json!({ "k": "v" })).await.unwrap();
            let job = store.create_job(exec.id, "a", None, JobStatus::Pending).await.unwrap();
            pool.close().await;
            (exec.id, job.id)
        };

        let pool = db::pool::create_pool(&url, 2).await.unwrap();
        let store = DbJobStore::new(pool);

        assert_eq!(store.load_workflow(workflow.id).await.unwrap(), workflow);
        let exec = store.get_execution(execution_id).await.unwrap();
        assert_eq!(exec.status, ExecutionStatus::Running);
        assert_eq!(exec.context, json!({ "k": "v" }));

        let pending = store.find_pending_job(job_id).await.unwrap();
        assert_eq!(pending.node_id, "a");
        assert!(store.update_job(job_id, JobStatus::Resolved, &json!(1)).await.unwrap());
        assert!(matches!(store.find_pending_job(job_id).await, Err(EngineError::JobNotFound(_))));
    }

    #[tokio::test]
    async fn missing_records_map_to_typed_errors() {
        let store = DbJobStore::new(db::pool::memory_pool().await.unwrap());
        let id = Uuid::new_v4();

        assert!(matches!(store.load_workflow(id).await, Err(EngineError::WorkflowNotFound(x)) if x == id));
        assert!(matches!(store.get_execution(id).await, Err(EngineError::ExecutionNotFound(x)) if x == id));
        assert!(matches!(store.get_job(id).await, Err(EngineError::JobNotFound(x)) if x == id));
    }
}
