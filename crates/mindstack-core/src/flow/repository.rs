//! FlowRepository trait definition.

use mindstack_types::error::RepositoryError;
use mindstack_types::flow::FlowExecution;

/// Repository trait for flow execution persistence.
///
/// Executions are upserted by id on every transition so active flows can be
/// restored after a restart. Implementations live in mindstack-infra.
pub trait FlowRepository: Send + Sync {
    /// Insert or replace an execution.
    fn save_execution(
        &self,
        execution: &FlowExecution,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// All executions still in `active` status.
    fn load_active(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<FlowExecution>, RepositoryError>> + Send;

    /// Executions for one session, newest first.
    fn list_for_session(
        &self,
        session_id: &str,
        limit: Option<i64>,
    ) -> impl std::future::Future<Output = Result<Vec<FlowExecution>, RepositoryError>> + Send;
}
