//! Prompt template catalog.
//!
//! Templates are keyed by intent. Flow steps reach a template through the
//! step -> intent table: a step's `prompt_intent` when set, otherwise a
//! template whose intent equals the step id.

use std::collections::{HashMap, HashSet};

use mindstack_types::error::ConfigurationError;
use mindstack_types::prompt::PromptTemplate;

use crate::flow::definition::FlowCatalog;

#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    by_intent: HashMap<String, PromptTemplate>,
    step_intents: HashMap<(String, String), String>,
}

impl TemplateCatalog {
    /// Validate templates and derive the step table from `flows`.
    ///
    /// Fails on duplicate template ids or intents, and on a step whose
    /// `prompt_intent` has no template.
    pub fn new(templates: Vec<PromptTemplate>, flows: &FlowCatalog) -> Result<Self, ConfigurationError> {
        let mut ids = HashSet::new();
        let mut by_intent = HashMap::new();
        for template in templates {
            if template.id.trim().is_empty() || template.intent.trim().is_empty() {
                return Err(ConfigurationError::Validation(
                    "prompt template id and intent must not be empty".to_string(),
                ));
            }
            if !ids.insert(template.id.clone()) {
                return Err(ConfigurationError::Validation(format!(
                    "duplicate prompt template id '{}'",
                    template.id
                )));
            }
            if by_intent.contains_key(&template.intent) {
                return Err(ConfigurationError::Validation(format!(
                    "more than one prompt template for intent '{}'",
                    template.intent
                )));
            }
            by_intent.insert(template.intent.clone(), template);
        }

        let mut step_intents = HashMap::new();
        for flow in flows.iter() {
            for step in &flow.steps {
                let intent = match &step.prompt_intent {
                    Some(intent) if by_intent.contains_key(intent) => intent.clone(),
                    Some(intent) => {
                        return Err(ConfigurationError::TemplateNotFound {
                            intent: intent.clone(),
                            step: Some(step.id.clone()),
                        });
                    }
                    None if by_intent.contains_key(&step.id) => step.id.clone(),
                    None => continue,
                };
                step_intents.insert((flow.id.clone(), step.id.clone()), intent);
            }
        }

        Ok(Self {
            by_intent,
            step_intents,
        })
    }

    pub fn for_intent(&self, intent: &str) -> Option<&PromptTemplate> {
        self.by_intent.get(intent)
    }

    /// Template mapped to a flow step, if the step has one.
    pub fn for_step(&self, flow_id: &str, step_id: &str) -> Option<&PromptTemplate> {
        self.step_intents
            .get(&(flow_id.to_string(), step_id.to_string()))
            .and_then(|intent| self.by_intent.get(intent))
    }

    /// Step first, then intent.
    pub fn select(
        &self,
        intent: &str,
        flow_step: Option<(&str, &str)>,
    ) -> Result<&PromptTemplate, ConfigurationError> {
        flow_step
            .and_then(|(flow_id, step_id)| self.for_step(flow_id, step_id))
            .or_else(|| self.for_intent(intent))
            .ok_or_else(|| ConfigurationError::TemplateNotFound {
                intent: intent.to_string(),
                step: flow_step.map(|(_, step)| step.to_string()),
            })
    }

    pub fn len(&self) -> usize {
        self.by_intent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_intent.is_empty()
    }

    /// Intents that have a template, sorted.
    pub fn intents(&self) -> Vec<&str> {
        let mut intents: Vec<&str> = self.by_intent.keys().map(String::as_str).collect();
        intents.sort_unstable();
        intents
    }
}
