//! Prompt template types.

use serde::{Deserialize, Serialize};

/// Template selected per intent (or per flow step through its prompt intent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: String,
    pub intent: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub user_prompt_template: String,
    /// Placeholder names the template expects. Informational only.
    #[serde(default)]
    pub variables: Vec<String>,
}

/// The two artifacts handed to the downstream generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledPrompt {
    pub system_prompt: String,
    pub user_prompt: String,
    pub template_id: String,
}
