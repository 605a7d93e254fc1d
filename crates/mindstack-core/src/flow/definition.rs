//! Flow definition validation and lookup.
//!
//! `FlowCatalog` is the validated, immutable set of flows for one avatar.
//! Lookup by entry intent picks the highest priority flow; ties keep load
//! order, so the first definition loaded wins.

use std::collections::HashSet;

use mindstack_types::config::MAX_DURATION_SECS;
use mindstack_types::error::ConfigurationError;
use mindstack_types::flow::{FLOW_COMPLETED, FlowDefinition};

/// Validate structural constraints on a `FlowDefinition`.
///
/// Checks:
/// - Id is non-empty
/// - At least one step exists
/// - All step ids are unique and none uses the completion sentinel
/// - Every `next_steps` entry names a step of this flow or the sentinel
/// - `max_duration_secs` fits a `TimeDelta`
pub fn validate_flow_definition(def: &FlowDefinition) -> Result<(), ConfigurationError> {
    if def.id.trim().is_empty() {
        return Err(ConfigurationError::Validation(
            "flow id must not be empty".to_string(),
        ));
    }

    if def.max_duration_secs > MAX_DURATION_SECS {
        return Err(ConfigurationError::Validation(format!(
            "flow '{}' has max_duration_secs {} above {MAX_DURATION_SECS}",
            def.id, def.max_duration_secs
        )));
    }

    if def.steps.is_empty() {
        return Err(ConfigurationError::EmptyFlow(def.id.clone()));
    }

    let mut seen_ids = HashSet::new();
    for step in &def.steps {
        if step.id.trim().is_empty() {
            return Err(ConfigurationError::Validation(format!(
                "flow '{}' has a step with an empty id",
                def.id
            )));
        }
        if step.id == FLOW_COMPLETED {
            return Err(ConfigurationError::Validation(format!(
                "flow '{}' uses reserved step id '{FLOW_COMPLETED}'",
                def.id
            )));
        }
        if !seen_ids.insert(step.id.as_str()) {
            return Err(ConfigurationError::Validation(format!(
                "flow '{}' has duplicate step id '{}'",
                def.id, step.id
            )));
        }
    }

    for step in &def.steps {
        for next in &step.next_steps {
            if next != FLOW_COMPLETED && !seen_ids.contains(next.as_str()) {
                return Err(ConfigurationError::UnknownStep {
                    flow_id: def.id.clone(),
                    step_id: next.clone(),
                });
            }
        }
    }

    Ok(())
}

/// Validated flows for one avatar, in load order.
#[derive(Debug, Clone, Default)]
pub struct FlowCatalog {
    flows: Vec<FlowDefinition>,
}

impl FlowCatalog {
    /// Validate every definition and reject duplicate flow ids.
    pub fn new(flows: Vec<FlowDefinition>) -> Result<Self, ConfigurationError> {
        let mut seen = HashSet::new();
        for def in &flows {
            validate_flow_definition(def)?;
            if !seen.insert(def.id.as_str()) {
                return Err(ConfigurationError::Validation(format!(
                    "duplicate flow id '{}'",
                    def.id
                )));
            }
        }
        Ok(Self { flows })
    }

    /// Standard flows followed by custom ones. A custom flow with the id of a
    /// standard flow replaces it in place.
    pub fn merged(
        standard: Vec<FlowDefinition>,
        custom: Vec<FlowDefinition>,
    ) -> Result<Self, ConfigurationError> {
        let mut flows = standard;
        for def in custom {
            match flows.iter_mut().find(|f| f.id == def.id) {
                Some(existing) => *existing = def,
                None => flows.push(def),
            }
        }
        Self::new(flows)
    }

    pub fn get(&self, flow_id: &str) -> Option<&FlowDefinition> {
        self.flows.iter().find(|f| f.id == flow_id)
    }

    /// Highest priority flow whose entry intents contain `intent`.
    pub fn find_by_entry_intent(&self, intent: &str) -> Option<&FlowDefinition> {
        let mut best: Option<&FlowDefinition> = None;
        for def in self.flows.iter().filter(|f| f.is_entry_intent(intent)) {
            match best {
                Some(current) if current.priority >= def.priority => {}
                _ => best = Some(def),
            }
        }
        best
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlowDefinition> {
        self.flows.iter()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Names of advancement rules referenced anywhere in the catalog.
    pub fn referenced_rules(&self) -> Vec<&str> {
        let mut rules = Vec::new();
        for def in &self.flows {
            if let Some(rule) = def.advancement.as_deref() {
                rules.push(rule);
            }
            for step in &def.steps {
                if let Some(rule) = step.advancement.as_deref() {
                    rules.push(rule);
                }
            }
        }
        rules.sort_unstable();
        rules.dedup();
        rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{flow, step};

    #[test]
    fn test_valid_flow_passes() {
        let def = flow("f1", &["demo_request"], 0, vec![
            step("s1", &["s2"]),
            step("s2", &["completed"]),
        ]);
        assert!(validate_flow_definition(&def).is_ok());
    }

    #[test]
    fn test_empty_flow_rejected() {
        let def = flow("f1", &[], 0, vec![]);
        assert!(matches!(
            validate_flow_definition(&def),
            Err(ConfigurationError::EmptyFlow(id)) if id == "f1"
        ));
    }

    #[test]
    fn test_unknown_successor_rejected() {
        let def = flow("f1", &[], 0, vec![step("s1", &["nope"])]);
        match validate_flow_definition(&def) {
            Err(ConfigurationError::UnknownStep { flow_id, step_id }) => {
                assert_eq!(flow_id, "f1");
                assert_eq!(step_id, "nope");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_step_rejected() {
        let def = flow("f1", &[], 0, vec![step("s1", &[]), step("s1", &[])]);
        let err = validate_flow_definition(&def).unwrap_err();
        assert!(err.to_string().contains("duplicate step id"));
    }

    #[test]
    fn test_out_of_range_max_duration_rejected() {
        let mut def = flow("f1", &[], 0, vec![step("s1", &["completed"])]);
        def.max_duration_secs = 100_000_000_000_000_000;
        let err = validate_flow_definition(&def).unwrap_err();
        assert!(err.to_string().contains("max_duration_secs"));

        def.max_duration_secs = MAX_DURATION_SECS;
        assert!(validate_flow_definition(&def).is_ok());
    }

    #[test]
    fn test_reserved_step_id_rejected() {
        let def = flow("f1", &[], 0, vec![step("completed", &[])]);
        assert!(validate_flow_definition(&def).is_err());
    }

    #[test]
    fn test_duplicate_flow_ids_rejected() {
        let a = flow("f1", &[], 0, vec![step("s1", &[])]);
        let b = flow("f1", &[], 0, vec![step("s1", &[])]);
        assert!(FlowCatalog::new(vec![a, b]).is_err());
    }

    #[test]
    fn test_priority_picks_highest() {
        let low = flow("low", &["buy"], 1, vec![step("s1", &[])]);
        let high = flow("high", &["buy"], 5, vec![step("s1", &[])]);
        let catalog = FlowCatalog::new(vec![low, high]).unwrap();
        assert_eq!(catalog.find_by_entry_intent("buy").unwrap().id, "high");
        assert!(catalog.find_by_entry_intent("other").is_none());
    }

    #[test]
    fn test_priority_tie_keeps_load_order() {
        let first = flow("first", &["buy"], 3, vec![step("s1", &[])]);
        let second = flow("second", &["buy"], 3, vec![step("s1", &[])]);
        let catalog = FlowCatalog::new(vec![first, second]).unwrap();
        assert_eq!(catalog.find_by_entry_intent("buy").unwrap().id, "first");
    }

    #[test]
    fn test_merged_custom_overrides_standard() {
        let standard = vec![
            flow("f1", &["a"], 0, vec![step("s1", &[])]),
            flow("f2", &["b"], 0, vec![step("s1", &[])]),
        ];
        let custom = vec![
            flow("f1", &["c"], 0, vec![step("x", &[])]),
            flow("f3", &["d"], 0, vec![step("s1", &[])]),
        ];
        let catalog = FlowCatalog::merged(standard, custom).unwrap();
        let ids: Vec<&str> = catalog.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["f1", "f2", "f3"]);
        assert!(catalog.get("f1").unwrap().is_entry_intent("c"));
    }

    #[test]
    fn test_referenced_rules_dedup() {
        let mut def = flow("f1", &[], 0, vec![step("s1", &[]), step("s2", &[])]);
        def.advancement = Some("answered".to_string());
        def.steps[0].advancement = Some("email_capture".to_string());
        def.steps[1].advancement = Some("answered".to_string());
        let catalog = FlowCatalog::new(vec![def]).unwrap();
        assert_eq!(catalog.referenced_rules(), vec!["answered", "email_capture"]);
    }
}
