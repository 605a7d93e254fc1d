//! SQLite flow execution repository.
//!
//! Implements `FlowRepository` from `mindstack-core`. The execution is stored
//! as a JSON document next to indexed `session_id`/`status` columns so active
//! flows can be reloaded without scanning documents.

use mindstack_core::flow::FlowRepository;
use mindstack_types::error::RepositoryError;
use mindstack_types::flow::FlowExecution;
use sqlx::Row;

use super::format_datetime;
use super::pool::DatabasePool;

/// SQLite-backed implementation of `FlowRepository`.
pub struct SqliteFlowRepository {
    pool: DatabasePool,
}

impl SqliteFlowRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn decode_rows(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<FlowExecution>, RepositoryError> {
    let mut executions = Vec::with_capacity(rows.len());
    for row in rows {
        let document: String = row
            .try_get("document")
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let execution: FlowExecution = serde_json::from_str(&document)
            .map_err(|e| RepositoryError::Query(format!("invalid flow execution document: {e}")))?;
        executions.push(execution);
    }
    Ok(executions)
}

impl FlowRepository for SqliteFlowRepository {
    async fn save_execution(&self, execution: &FlowExecution) -> Result<(), RepositoryError> {
        let document = serde_json::to_string(execution)
            .map_err(|e| RepositoryError::Query(format!("failed to serialize flow execution: {e}")))?;

        sqlx::query(
            r#"INSERT INTO flow_executions
                   (id, session_id, flow_id, status, current_step, document, start_time, last_activity)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (id) DO UPDATE SET
                   status = excluded.status,
                   current_step = excluded.current_step,
                   document = excluded.document,
                   last_activity = excluded.last_activity"#,
        )
        .bind(execution.id.to_string())
        .bind(&execution.session_id)
        .bind(&execution.flow_id)
        .bind(execution.status.to_string())
        .bind(&execution.current_step)
        .bind(&document)
        .bind(format_datetime(&execution.start_time))
        .bind(format_datetime(&execution.last_activity))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn load_active(&self) -> Result<Vec<FlowExecution>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT document FROM flow_executions WHERE status = 'active' ORDER BY start_time",
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        decode_rows(&rows)
    }

    async fn list_for_session(
        &self,
        session_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<FlowExecution>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT document FROM flow_executions WHERE session_id = ? ORDER BY start_time DESC LIMIT ?",
        )
        .bind(session_id)
        .bind(limit.unwrap_or(-1))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        decode_rows(&rows)
    }
}
