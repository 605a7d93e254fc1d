//! YAML definition documents on the local filesystem.
//!
//! Implements `DefinitionSource` from `mindstack-core` over the layout in
//! [`crate::filesystem`]. A missing standard document is an empty set; a
//! missing custom directory means the avatar id is unknown.

use std::path::Path;

use mindstack_core::definitions::{
    DefinitionSource, parse_flows_yaml, parse_intents_yaml, parse_prompts_yaml,
};
use mindstack_types::error::ConfigurationError;
use mindstack_types::flow::FlowDefinition;
use mindstack_types::intent::IntentDefinition;
use mindstack_types::prompt::PromptTemplate;
use tracing::debug;

use crate::filesystem::{DataLayout, is_safe_segment};

pub struct FileDefinitionSource {
    layout: DataLayout,
}

impl FileDefinitionSource {
    pub fn new(layout: DataLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }
}

fn check_segment(kind: &str, value: &str) -> Result<(), ConfigurationError> {
    if is_safe_segment(value) {
        Ok(())
    } else {
        Err(ConfigurationError::Validation(format!(
            "invalid {kind} '{value}': use letters, digits, '-' or '_'"
        )))
    }
}

/// File contents, or `None` if it does not exist.
async fn read_optional(path: &Path) -> Result<Option<String>, ConfigurationError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "Definition document not found");
            Ok(None)
        }
        Err(err) => Err(ConfigurationError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }),
    }
}

async fn read_intents(path: &Path) -> Result<Vec<IntentDefinition>, ConfigurationError> {
    match read_optional(path).await? {
        Some(content) => parse_intents_yaml(&content, &path.display().to_string()),
        None => Ok(Vec::new()),
    }
}

async fn read_flows(path: &Path) -> Result<Vec<FlowDefinition>, ConfigurationError> {
    match read_optional(path).await? {
        Some(content) => parse_flows_yaml(&content, &path.display().to_string()),
        None => Ok(Vec::new()),
    }
}

impl DefinitionSource for FileDefinitionSource {
    async fn load_intent_definitions(
        &self,
        avatar_type: &str,
    ) -> Result<Vec<IntentDefinition>, ConfigurationError> {
        check_segment("avatar type", avatar_type)?;
        read_intents(&self.layout.avatar_dir(avatar_type).join("intents.yaml")).await
    }

    async fn load_flow_definitions(
        &self,
        avatar_type: &str,
    ) -> Result<Vec<FlowDefinition>, ConfigurationError> {
        check_segment("avatar type", avatar_type)?;
        read_flows(&self.layout.avatar_dir(avatar_type).join("flows.yaml")).await
    }

    async fn load_prompt_templates(&self) -> Result<Vec<PromptTemplate>, ConfigurationError> {
        let path = self.layout.prompts_path();
        match read_optional(&path).await? {
            Some(content) => parse_prompts_yaml(&content, &path.display().to_string()),
            None => Ok(Vec::new()),
        }
    }

    async fn load_custom_intents(
        &self,
        avatar_id: &str,
    ) -> Result<Option<Vec<IntentDefinition>>, ConfigurationError> {
        check_segment("avatar id", avatar_id)?;
        let dir = self.layout.custom_dir(avatar_id);
        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            return Ok(None);
        }
        Ok(Some(read_intents(&dir.join("intents.yaml")).await?))
    }

    async fn load_custom_flows(
        &self,
        avatar_id: &str,
    ) -> Result<Option<Vec<FlowDefinition>>, ConfigurationError> {
        check_segment("avatar id", avatar_id)?;
        let dir = self.layout.custom_dir(avatar_id);
        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            return Ok(None);
        }
        Ok(Some(read_flows(&dir.join("flows.yaml")).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mindstack_core::definitions::DefinitionSet;
    use mindstack_core::flow::AdvancementRegistry;
    use mindstack_types::avatar::AvatarSelector;
    use tempfile::TempDir;

    async fn write(path: std::path::PathBuf, content: &str) {
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(path, content).await.unwrap();
    }

    async fn fixture() -> (TempDir, FileDefinitionSource) {
        let tmp = TempDir::new().unwrap();
        let layout = DataLayout::new(tmp.path());
        write(
            layout.avatar_dir("sales").join("intents.yaml"),
            r#"
intents:
  - name: greeting
    keywords: [hello]
  - name: demo_request
    keywords: [demo]
    requires_flow: true
  - name: general_question
"#,
        )
        .await;
        write(
            layout.avatar_dir("sales").join("flows.yaml"),
            r#"
flows:
  - id: demo
    entry_intents: [demo_request]
    steps:
      - id: qualify
        next_steps: [schedule]
      - id: schedule
        advancement: email_capture
        prompt_intent: demo_request
        next_steps: [completed]
"#,
        )
        .await;
        write(
            layout.prompts_path(),
            r#"
templates:
  - id: greeting
    intent: greeting
    user_prompt_template: "Greet {counterpart_name}: {user_message}"
  - id: demo
    intent: demo_request
    user_prompt_template: "{user_message}"
  - id: general
    intent: general_question
    user_prompt_template: "{user_message}"
"#,
        )
        .await;
        write(
            layout.custom_dir("acme").join("intents.yaml"),
            "intents:\n  - name: warranty_question\n    keywords: [warranty]\n",
        )
        .await;
        (tmp, FileDefinitionSource::new(layout))
    }

    #[tokio::test]
    async fn test_load_standard_documents() {
        let (_tmp, source) = fixture().await;
        let intents = source.load_intent_definitions("sales").await.unwrap();
        assert_eq!(intents.len(), 3);
        let flows = source.load_flow_definitions("sales").await.unwrap();
        assert_eq!(flows[0].steps.len(), 2);
        assert_eq!(source.load_prompt_templates().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_missing_avatar_type_is_empty() {
        let (_tmp, source) = fixture().await;
        assert!(source.load_intent_definitions("support").await.unwrap().is_empty());
        assert!(source.load_flow_definitions("support").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_custom_avatar_lookup() {
        let (_tmp, source) = fixture().await;
        let custom = source.load_custom_intents("acme").await.unwrap().unwrap();
        assert_eq!(custom[0].name, "warranty_question");
        // Directory exists without a flows document.
        assert_eq!(source.load_custom_flows("acme").await.unwrap(), Some(vec![]));
        assert!(source.load_custom_intents("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let (_tmp, source) = fixture().await;
        let err = source.load_intent_definitions("../sales").await.unwrap_err();
        assert!(matches!(err, ConfigurationError::Validation(_)));
    }

    #[tokio::test]
    async fn test_full_definition_set_loads() {
        let (_tmp, source) = fixture().await;
        let set = DefinitionSet::load(
            &source,
            &AvatarSelector::custom("sales", "acme"),
            &AdvancementRegistry::with_defaults(),
        )
        .await
        .unwrap();
        assert!(set.intents.get("warranty_question").is_some());
        assert_eq!(set.templates.for_step("demo", "schedule").unwrap().id, "demo");
    }

    #[tokio::test]
    async fn test_malformed_document_names_path() {
        let (tmp, source) = fixture().await;
        write(
            DataLayout::new(tmp.path()).avatar_dir("broken").join("intents.yaml"),
            "intents: {{{",
        )
        .await;
        match source.load_intent_definitions("broken").await {
            Err(ConfigurationError::Parse { source_name, .. }) => {
                assert!(source_name.ends_with("intents.yaml"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
