//! Definition documents: parsing, the `DefinitionSource` port and the
//! resolved per-avatar `DefinitionSet`.
//!
//! Documents are YAML:
//! ```yaml
//! # intents.yaml
//! intents:
//!   - name: pricing_question
//!     keywords: [price, cost]
//! # flows.yaml
//! flows:
//!   - id: demo
//!     entry_intents: [demo_request]
//!     steps:
//!       - id: qualify
//!         next_steps: [completed]
//! # prompts.yaml
//! templates:
//!   - id: pricing
//!     intent: pricing_question
//!     user_prompt_template: "{user_message}"
//! ```

use mindstack_types::avatar::AvatarSelector;
use mindstack_types::error::ConfigurationError;
use mindstack_types::flow::FlowDefinition;
use mindstack_types::intent::IntentDefinition;
use mindstack_types::prompt::PromptTemplate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::flow::definition::FlowCatalog;
use crate::flow::advancement::AdvancementRegistry;
use crate::intent::catalog::{IntentCatalog, validate_intent_definitions};
use crate::prompt::templates::TemplateCatalog;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct IntentDocument {
    #[serde(default)]
    pub intents: Vec<IntentDefinition>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FlowDocument {
    #[serde(default)]
    pub flows: Vec<FlowDefinition>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PromptDocument {
    #[serde(default)]
    pub templates: Vec<PromptTemplate>,
}

fn parse_error(source_name: &str, err: serde_yaml_ng::Error) -> ConfigurationError {
    ConfigurationError::Parse {
        source_name: source_name.to_string(),
        message: err.to_string(),
    }
}

/// Parse and validate an intents document. Empty input yields an empty set.
pub fn parse_intents_yaml(
    yaml: &str,
    source_name: &str,
) -> Result<Vec<IntentDefinition>, ConfigurationError> {
    if yaml.trim().is_empty() {
        return Ok(Vec::new());
    }
    let doc: IntentDocument =
        serde_yaml_ng::from_str(yaml).map_err(|e| parse_error(source_name, e))?;
    validate_intent_definitions(&doc.intents)?;
    Ok(doc.intents)
}

/// Parse a flows document. Structural validation runs when the catalog is built.
pub fn parse_flows_yaml(
    yaml: &str,
    source_name: &str,
) -> Result<Vec<FlowDefinition>, ConfigurationError> {
    if yaml.trim().is_empty() {
        return Ok(Vec::new());
    }
    let doc: FlowDocument =
        serde_yaml_ng::from_str(yaml).map_err(|e| parse_error(source_name, e))?;
    Ok(doc.flows)
}

pub fn parse_prompts_yaml(
    yaml: &str,
    source_name: &str,
) -> Result<Vec<PromptTemplate>, ConfigurationError> {
    if yaml.trim().is_empty() {
        return Ok(Vec::new());
    }
    let doc: PromptDocument =
        serde_yaml_ng::from_str(yaml).map_err(|e| parse_error(source_name, e))?;
    Ok(doc.templates)
}

/// Port for static definition documents.
///
/// Implementations live in mindstack-infra (e.g., `FileDefinitionSource`).
/// Custom loaders return `None` for avatar ids they do not know; callers
/// treat that as an empty custom set.
pub trait DefinitionSource: Send + Sync {
    fn load_intent_definitions(
        &self,
        avatar_type: &str,
    ) -> impl std::future::Future<Output = Result<Vec<IntentDefinition>, ConfigurationError>> + Send;

    fn load_flow_definitions(
        &self,
        avatar_type: &str,
    ) -> impl std::future::Future<Output = Result<Vec<FlowDefinition>, ConfigurationError>> + Send;

    fn load_prompt_templates(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<PromptTemplate>, ConfigurationError>> + Send;

    fn load_custom_intents(
        &self,
        avatar_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Vec<IntentDefinition>>, ConfigurationError>> + Send;

    fn load_custom_flows(
        &self,
        avatar_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Vec<FlowDefinition>>, ConfigurationError>> + Send;
}

/// Everything the engine needs for one avatar, validated together.
#[derive(Debug, Clone)]
pub struct DefinitionSet {
    pub intents: IntentCatalog,
    pub flows: FlowCatalog,
    pub templates: TemplateCatalog,
}

impl DefinitionSet {
    pub fn selector(&self) -> &AvatarSelector {
        self.intents.selector()
    }

    /// Load and cross-validate all documents for `selector`.
    ///
    /// Every advancement rule referenced by a flow must exist in `registry`.
    pub async fn load<S: DefinitionSource>(
        source: &S,
        selector: &AvatarSelector,
        registry: &AdvancementRegistry,
    ) -> Result<Self, ConfigurationError> {
        let avatar_type = selector.avatar_type();
        let standard_intents = source.load_intent_definitions(avatar_type).await?;
        let standard_flows = source.load_flow_definitions(avatar_type).await?;

        let (custom_intents, custom_flows) = match selector.custom_id() {
            Some(avatar_id) => (
                source.load_custom_intents(avatar_id).await?.unwrap_or_default(),
                source.load_custom_flows(avatar_id).await?.unwrap_or_default(),
            ),
            None => (Vec::new(), Vec::new()),
        };

        let intents = IntentCatalog::new(selector.clone(), standard_intents, custom_intents)?;
        let flows = FlowCatalog::merged(standard_flows, custom_flows)?;
        registry.check_catalog(&flows)?;
        let templates = TemplateCatalog::new(source.load_prompt_templates().await?, &flows)?;

        info!(
            avatar = %selector,
            intents = intents.len(),
            flows = flows.len(),
            templates = templates.len(),
            "Loaded definitions"
        );

        Ok(Self {
            intents,
            flows,
            templates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticDefinitionSource;

    #[test]
    fn test_parse_intents_yaml() {
        let yaml = r#"
intents:
  - name: pricing_question
    description: Asking about cost
    keywords: [price, cost]
  - name: signup
    repeatable: false
    max_age_secs: 60
"#;
        let intents = parse_intents_yaml(yaml, "intents.yaml").unwrap();
        assert_eq!(intents.len(), 2);
        assert_eq!(intents[0].keywords, vec!["price".to_string(), "cost".to_string()]);
        assert!(!intents[1].repeatable);
        assert_eq!(intents[1].max_age_secs, Some(60));
    }

    #[test]
    fn test_parse_flows_yaml() {
        let yaml = r#"
flows:
  - id: demo
    entry_intents: [demo_request]
    priority: 2
    max_duration_secs: 600
    steps:
      - id: qualify
        next_steps: [schedule]
      - id: schedule
        advancement: email_capture
        next_steps: [completed]
"#;
        let flows = parse_flows_yaml(yaml, "flows.yaml").unwrap();
        assert_eq!(flows[0].id, "demo");
        assert_eq!(flows[0].steps.len(), 2);
        assert_eq!(flows[0].steps[1].advancement.as_deref(), Some("email_capture"));
        assert_eq!(flows[0].max_duration_secs, 600);
    }

    #[test]
    fn test_parse_error_names_source() {
        let err = parse_intents_yaml("intents: [[", "avatars/sales/intents.yaml").unwrap_err();
        match err {
            ConfigurationError::Parse { source_name, .. } => {
                assert_eq!(source_name, "avatars/sales/intents.yaml");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_empty_documents_are_empty_sets() {
        assert!(parse_intents_yaml("", "x").unwrap().is_empty());
        assert!(parse_flows_yaml("  \n", "x").unwrap().is_empty());
        assert!(parse_prompts_yaml("", "x").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_standard_set() {
        let source = StaticDefinitionSource::sample();
        let set = DefinitionSet::load(
            &source,
            &AvatarSelector::standard("sales"),
            &AdvancementRegistry::with_defaults(),
        )
        .await
        .unwrap();
        assert!(set.intents.get("pricing_question").is_some());
        assert!(set.intents.get("warranty_question").is_none());
        assert!(set.flows.get("demo").is_some());
    }

    #[tokio::test]
    async fn test_load_custom_set_unions() {
        let source = StaticDefinitionSource::sample();
        let set = DefinitionSet::load(
            &source,
            &AvatarSelector::custom("sales", "acme"),
            &AdvancementRegistry::with_defaults(),
        )
        .await
        .unwrap();
        assert!(set.intents.get("pricing_question").is_some());
        assert!(set.intents.get("warranty_question").is_some());
    }

    #[tokio::test]
    async fn test_unknown_custom_id_yields_standard_only() {
        let source = StaticDefinitionSource::sample();
        let set = DefinitionSet::load(
            &source,
            &AvatarSelector::custom("sales", "nobody"),
            &AdvancementRegistry::with_defaults(),
        )
        .await
        .unwrap();
        let standard = DefinitionSet::load(
            &source,
            &AvatarSelector::standard("sales"),
            &AdvancementRegistry::with_defaults(),
        )
        .await
        .unwrap();
        assert_eq!(set.intents.len(), standard.intents.len());
    }

    #[tokio::test]
    async fn test_unregistered_rule_rejected() {
        let source = StaticDefinitionSource::sample();
        let err = DefinitionSet::load(
            &source,
            &AvatarSelector::standard("sales"),
            &AdvancementRegistry::empty(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownAdvancementRule(_)));
    }
}
