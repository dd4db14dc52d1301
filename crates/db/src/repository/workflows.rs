//! Workflow definition storage.

use chrono::Utc;
use sqlx::types::Json;
use uuid::Uuid;

use crate::{models::WorkflowRow, DbError, DbPool};

/// Store a workflow definition under `id`.
///
/// Definitions are immutable once published: if `id` already exists the
/// stored definition is kept and this call is a no-op.
pub async fn save_workflow(
    pool: &DbPool,
    id: Uuid,
    name: &str,
    definition: serde_json::Value,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO workflows (id, name, definition, created_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(Json(definition))
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch a single workflow by its primary key.
pub async fn get_workflow(pool: &DbPool, id: Uuid) -> Result<WorkflowRow, DbError> {
    sqlx::query_as::<_, WorkflowRow>(
        r#"SELECT id, name, definition, created_at FROM workflows WHERE id = ?"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::pool::memory_pool;

    #[tokio::test]
    async fn definitions_are_insert_once() {
        let pool = memory_pool().await.unwrap();
        let id = Uuid::new_v4();

        save_workflow(&pool, id, "first", json!({ "v": 1 })).await.unwrap();
        save_workflow(&pool, id, "second", json!({ "v": 2 })).await.unwrap();

        let row = get_workflow(&pool, id).await.unwrap();
        assert_eq!(row.name, "first");
        assert_eq!(row.definition.0, json!({ "v": 1 }));
    }

    #[tokio::test]
    async fn missing_workflow_is_not_found() {
        let pool = memory_pool().await.unwrap();
        assert!(matches!(get_workflow(&pool, Uuid::new_v4()).await, Err(DbError::NotFound)));
    }
}
