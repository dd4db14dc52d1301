//! Execution repository functions.

use chrono::Utc;
use sqlx::types::Json;
use uuid::Uuid;

use crate::{models::ExecutionRow, DbError, DbPool};

const COLUMNS: &str = "id, workflow_id, status, context, created_at, updated_at, finished_at";

/// Create a new execution record in the given status.
pub async fn create_execution(
    pool: &DbPool,
    workflow_id: Uuid,
    status: &str,
    context: serde_json::Value,
) -> Result<ExecutionRow, DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    let row = sqlx::query_as::<_, ExecutionRow>(&format!(
        r#"
        INSERT INTO executions (id, workflow_id, status, context, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(id)
    .bind(workflow_id)
    .bind(status)
    .bind(Json(context))
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetch one execution.
pub async fn get_execution(pool: &DbPool, id: Uuid) -> Result<ExecutionRow, DbError> {
    sqlx::query_as::<_, ExecutionRow>(&format!("SELECT {COLUMNS} FROM executions WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Compare-and-swap the execution status from `from` to `to`.
///
/// Sets `finished_at` when `finished` is true. Returns `false` (and changes
/// nothing) when the stored status is not `from`.
pub async fn transition_execution(
    pool: &DbPool,
    id: Uuid,
    from: &str,
    to: &str,
    finished: bool,
) -> Result<bool, DbError> {
    let now = Utc::now();
    let finished_at = finished.then_some(now);

    let result = sqlx::query(
        r#"
        UPDATE executions
        SET status = ?, updated_at = ?, finished_at = COALESCE(?, finished_at)
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(to)
    .bind(now)
    .bind(finished_at)
    .bind(id)
    .bind(from)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::pool::memory_pool;
    use crate::repository::workflows::save_workflow;

    #[tokio::test]
    async fn transition_only_applies_from_expected_status() {
        let pool = memory_pool().await.unwrap();
        let workflow_id = Uuid::new_v4();
        save_workflow(&pool, workflow_id, "wf", json!({})).await.unwrap();

        let exec = create_execution(&pool, workflow_id, "running", json!({ "a": 1 })).await.unwrap();
        assert_eq!(exec.context.0, json!({ "a": 1 }));

        assert!(transition_execution(&pool, exec.id, "running", "suspended", false).await.unwrap());
        assert!(!transition_execution(&pool, exec.id, "running", "resolved", true).await.unwrap());

        let row = get_execution(&pool, exec.id).await.unwrap();
        assert_eq!(row.status, "suspended");
        assert!(row.finished_at.is_none());

        assert!(transition_execution(&pool, exec.id, "suspended", "aborted", true).await.unwrap());
        let row = get_execution(&pool, exec.id).await.unwrap();
        assert_eq!(row.status, "aborted");
        assert!(row.finished_at.is_some());
    }
}
