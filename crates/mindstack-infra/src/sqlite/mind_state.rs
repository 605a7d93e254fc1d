//! SQLite session memory repository.
//!
//! Implements `MindStateRepository` from `mindstack-core`. Each session is
//! one JSON document; `save` replaces it wholesale.

use mindstack_core::memory::MindStateRepository;
use mindstack_types::error::RepositoryError;
use mindstack_types::memory::MindStateStack;
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime};

/// SQLite-backed implementation of `MindStateRepository`.
pub struct SqliteMindStateRepository {
    pool: DatabasePool,
}

impl SqliteMindStateRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn decode_document(document: &str) -> Result<MindStateStack, RepositoryError> {
    serde_json::from_str(document)
        .map_err(|e| RepositoryError::Query(format!("invalid mind state document: {e}")))
}

impl MindStateRepository for SqliteMindStateRepository {
    async fn load(&self, session_id: &str) -> Result<Option<MindStateStack>, RepositoryError> {
        let row = sqlx::query("SELECT document, updated_at FROM mind_states WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let document: String = row
                    .try_get("document")
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                let updated_at: String = row
                    .try_get("updated_at")
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                let mut state = decode_document(&document)?;
                // The column is authoritative if the two ever disagree.
                state.updated_at = parse_datetime(&updated_at)?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, state: &MindStateStack) -> Result<(), RepositoryError> {
        let document = serde_json::to_string(state)
            .map_err(|e| RepositoryError::Query(format!("failed to serialize mind state: {e}")))?;

        sqlx::query(
            r#"INSERT INTO mind_states (session_id, document, created_at, updated_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT (session_id) DO UPDATE SET document = excluded.document, updated_at = excluded.updated_at"#,
        )
        .bind(&state.session_id)
        .bind(&document)
        .bind(format_datetime(&state.created_at))
        .bind(format_datetime(&state.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn list_sessions(&self, limit: Option<i64>) -> Result<Vec<String>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT session_id FROM mind_states ORDER BY updated_at DESC, session_id LIMIT ?",
        )
        .bind(limit.unwrap_or(-1))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in &rows {
            let session_id: String = row
                .try_get("session_id")
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            sessions.push(session_id);
        }
        Ok(sessions)
    }
}
