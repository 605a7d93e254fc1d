use thiserror::Error;

use crate::llm::LlmError;

/// Errors from repository operations (used by trait definitions in mindstack-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Inconsistent or unreadable definition documents.
///
/// These cannot be compensated for at runtime: the turn that hits one fails.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("no prompt template for intent '{intent}' (flow step: {step:?})")]
    TemplateNotFound { intent: String, step: Option<String> },

    #[error("unknown flow '{0}'")]
    UnknownFlow(String),

    #[error("flow '{flow_id}' has no step '{step_id}'")]
    UnknownStep { flow_id: String, step_id: String },

    #[error("flow '{0}' has no steps")]
    EmptyFlow(String),

    #[error("advancement rule '{0}' is not registered")]
    UnknownAdvancementRule(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("parse error in {source_name}: {message}")]
    Parse { source_name: String, message: String },

    #[error("I/O error reading {path}: {message}")]
    Io { path: String, message: String },
}

/// Error surfaced by a single orchestration turn.
///
/// Classification and flow anomalies never reach this type; they degrade to
/// a generic intent inside the engine.
#[derive(Debug, Error)]
pub enum MindError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl MindError {
    /// Whether the failure stems from a broken definition document.
    pub fn is_configuration(&self) -> bool {
        matches!(self, MindError::Configuration(_))
    }

    /// Text safe to show an end user. Detail stays in the logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            MindError::InvalidInput(_) => "Please enter a message.",
            _ => "Sorry, processing your message failed. Please try again.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_template_not_found_display() {
        let err = ConfigurationError::TemplateNotFound {
            intent: "pricing_question".to_string(),
            step: Some("collect_email".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("pricing_question"));
        assert!(msg.contains("collect_email"));
    }

    #[test]
    fn test_mind_error_from_configuration() {
        let err: MindError = ConfigurationError::UnknownFlow("onboarding".to_string()).into();
        assert!(err.is_configuration());
        assert_eq!(err.to_string(), "unknown flow 'onboarding'");
        assert!(err.user_message().contains("processing your message failed"));
    }

    #[test]
    fn test_mind_error_from_repository_is_not_configuration() {
        let err: MindError = RepositoryError::Connection.into();
        assert!(!err.is_configuration());
        assert_eq!(err.to_string(), "database connection error");
    }
}
