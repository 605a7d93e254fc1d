//! MindStateRepository trait definition.
//!
//! Session memory is persisted as one document per session with full-replace
//! semantics: `save` upserts the whole `MindStateStack`.

use mindstack_types::error::RepositoryError;
use mindstack_types::memory::MindStateStack;

/// Repository trait for session memory persistence.
///
/// Implementations live in mindstack-infra (e.g., `SqliteMindStateRepository`).
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait MindStateRepository: Send + Sync {
    /// Load the memory document for a session, if one was ever saved.
    fn load(
        &self,
        session_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<MindStateStack>, RepositoryError>> + Send;

    /// Upsert the full memory document.
    fn save(
        &self,
        state: &MindStateStack,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// List session ids with a stored document, most recently updated first.
    fn list_sessions(
        &self,
        limit: Option<i64>,
    ) -> impl std::future::Future<Output = Result<Vec<String>, RepositoryError>> + Send;
}
