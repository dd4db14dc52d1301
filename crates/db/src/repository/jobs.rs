//! Job repository functions.
//!
//! Jobs are append-only. The only mutation is the single transition out of
//! `pending`, done as a compare-and-swap so duplicate resumes are rejected
//! rather than double-applied.

use chrono::Utc;
use sqlx::types::Json;
use uuid::Uuid;

use crate::{models::JobRow, DbError, DbPool};

const COLUMNS: &str =
    "id, execution_id, node_id, upstream_id, status, result, created_at, updated_at";

/// Insert a new job.
pub async fn insert_job(
    pool: &DbPool,
    execution_id: Uuid,
    node_id: &str,
    upstream_id: Option<Uuid>,
    status: &str,
) -> Result<JobRow, DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    let row = sqlx::query_as::<_, JobRow>(&format!(
        r#"
        INSERT INTO jobs (id, execution_id, node_id, upstream_id, status, result, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(id)
    .bind(execution_id)
    .bind(node_id)
    .bind(upstream_id)
    .bind(status)
    .bind(Json(serde_json::Value::Null))
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Move a `pending` job to `status` with `result`.
///
/// Returns `false` (and changes nothing) if the job is not `pending`.
pub async fn update_job(
    pool: &DbPool,
    job_id: Uuid,
    status: &str,
    result: &serde_json::Value,
) -> Result<bool, DbError> {
    let outcome = sqlx::query(
        r#"
        UPDATE jobs
        SET status = ?, result = ?, updated_at = ?
        WHERE id = ? AND status = 'pending'
        "#,
    )
    .bind(status)
    .bind(Json(result))
    .bind(Utc::now())
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(outcome.rows_affected() == 1)
}

/// Fetch one job regardless of status.
pub async fn get_job(pool: &DbPool, job_id: Uuid) -> Result<JobRow, DbError> {
    sqlx::query_as::<_, JobRow>(&format!("SELECT {COLUMNS} FROM jobs WHERE id = ?"))
        .bind(job_id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Fetch a job only while it is still `pending`.
pub async fn find_pending_job(pool: &DbPool, job_id: Uuid) -> Result<JobRow, DbError> {
    sqlx::query_as::<_, JobRow>(&format!(
        "SELECT {COLUMNS} FROM jobs WHERE id = ? AND status = 'pending'"
    ))
    .bind(job_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// All jobs of an execution in creation order.
pub async fn list_jobs(pool: &DbPool, execution_id: Uuid) -> Result<Vec<JobRow>, DbError> {
    let rows = sqlx::query_as::<_, JobRow>(&format!(
        "SELECT {COLUMNS} FROM jobs WHERE execution_id = ? ORDER BY seq ASC"
    ))
    .bind(execution_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::pool::memory_pool;
    use crate::repository::{executions::create_execution, workflows::save_workflow};

    async fn execution(pool: &DbPool) -> Uuid {
        let workflow_id = Uuid::new_v4();
        save_workflow(pool, workflow_id, "wf", json!({})).await.unwrap();
        create_execution(pool, workflow_id, "running", json!({})).await.unwrap().id
    }

    #[tokio::test]
    async fn pending_job_is_updated_exactly_once() {
        let pool = memory_pool().await.unwrap();
        let exec_id = execution(&pool).await;

        let job = insert_job(&pool, exec_id, "a", None, "pending").await.unwrap();
        assert_eq!(find_pending_job(&pool, job.id).await.unwrap().id, job.id);

        assert!(update_job(&pool, job.id, "resolved", &json!({ "x": 1 })).await.unwrap());
        assert!(!update_job(&pool, job.id, "failed", &json!("late")).await.unwrap());

        let stored = get_job(&pool, job.id).await.unwrap();
        assert_eq!(stored.status, "resolved");
        assert_eq!(stored.result.0, json!({ "x": 1 }));
        assert!(matches!(find_pending_job(&pool, job.id).await, Err(DbError::NotFound)));
    }

    #[tokio::test]
    async fn jobs_are_listed_in_creation_order() {
        let pool = memory_pool().await.unwrap();
        let exec_id = execution(&pool).await;

        let first = insert_job(&pool, exec_id, "start", None, "pending").await.unwrap();
        let second = insert_job(&pool, exec_id, "next", Some(first.id), "pending").await.unwrap();
        let third = insert_job(&pool, exec_id, "end", Some(second.id), "pending").await.unwrap();

        let ids: Vec<Uuid> = list_jobs(&pool, exec_id).await.unwrap().iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![first.id, second.id, third.id]);
        assert_eq!(get_job(&pool, third.id).await.unwrap().upstream_id, Some(second.id));
    }
}
