//! Knowledge lookup port.
//!
//! Retrieval (vector search or otherwise) is external to the engine. The
//! orchestrator asks an optional `KnowledgeSource` for snippets relevant to
//! the user's message and appends them to the prompt.

use std::future::Future;
use std::pin::Pin;

/// Errors from a knowledge lookup. Never fatal for a turn.
#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    #[error("knowledge source unavailable: {0}")]
    Unavailable(String),

    #[error("knowledge query failed: {0}")]
    Query(String),
}

pub trait KnowledgeSource: Send + Sync {
    fn query(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<Vec<String>, KnowledgeError>> + Send;
}

/// Object-safe version of [`KnowledgeSource`] with boxed futures.
pub trait KnowledgeSourceDyn: Send + Sync {
    fn query_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, KnowledgeError>> + Send + 'a>>;
}

impl<T: KnowledgeSource> KnowledgeSourceDyn for T {
    fn query_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, KnowledgeError>> + Send + 'a>> {
        Box::pin(self.query(text))
    }
}

/// Type-erased knowledge source, so the orchestrator need not be generic over it.
pub struct BoxKnowledgeSource {
    inner: Box<dyn KnowledgeSourceDyn + Send + Sync>,
}

impl BoxKnowledgeSource {
    pub fn new<T: KnowledgeSource + 'static>(source: T) -> Self {
        Self {
            inner: Box::new(source),
        }
    }

    pub async fn query(&self, text: &str) -> Result<Vec<String>, KnowledgeError> {
        self.inner.query_boxed(text).await
    }
}

/// Fixed snippets returned for every query whose text contains the key.
///
/// Backs the CLI's `--knowledge` file option.
#[derive(Debug, Clone, Default)]
pub struct StaticKnowledge {
    entries: Vec<(String, String)>,
}

impl StaticKnowledge {
    /// Entries are `(trigger, snippet)`; triggers match case-insensitively.
    pub fn new(entries: Vec<(String, String)>) -> Self {
        Self { entries }
    }
}

impl KnowledgeSource for StaticKnowledge {
    async fn query(&self, text: &str) -> Result<Vec<String>, KnowledgeError> {
        let lower = text.to_lowercase();
        Ok(self
            .entries
            .iter()
            .filter(|(trigger, _)| lower.contains(&trigger.to_lowercase()))
            .map(|(_, snippet)| snippet.clone())
            .collect())
    }
}
