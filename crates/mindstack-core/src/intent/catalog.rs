//! Resolved intent set for one avatar.

use std::collections::HashSet;

use mindstack_types::avatar::AvatarSelector;
use mindstack_types::config::MAX_DURATION_SECS;
use mindstack_types::error::ConfigurationError;
use mindstack_types::intent::IntentDefinition;

/// Validate a single intent document: non-empty, unique names, confidence
/// thresholds within `0.0..=1.0` and a `max_age_secs` that fits a `TimeDelta`.
pub fn validate_intent_definitions(intents: &[IntentDefinition]) -> Result<(), ConfigurationError> {
    let mut seen = HashSet::new();
    for def in intents {
        if def.name.trim().is_empty() {
            return Err(ConfigurationError::Validation(
                "intent name must not be empty".to_string(),
            ));
        }
        if !seen.insert(def.name.as_str()) {
            return Err(ConfigurationError::Validation(format!(
                "duplicate intent name '{}'",
                def.name
            )));
        }
        if !(0.0..=1.0).contains(&def.confidence_threshold) {
            return Err(ConfigurationError::Validation(format!(
                "intent '{}' has confidence_threshold {} outside 0..1",
                def.name, def.confidence_threshold
            )));
        }
        if def.max_age_secs.is_some_and(|secs| secs > MAX_DURATION_SECS) {
            return Err(ConfigurationError::Validation(format!(
                "intent '{}' has max_age_secs above {MAX_DURATION_SECS}",
                def.name
            )));
        }
    }
    Ok(())
}

/// The active, ordered intent set.
///
/// For a custom avatar this is the standard set for its type followed by the
/// custom set; a custom intent sharing a standard intent's name replaces it
/// in place. Order matters: keyword matching takes the first hit.
#[derive(Debug, Clone)]
pub struct IntentCatalog {
    selector: AvatarSelector,
    intents: Vec<IntentDefinition>,
}

impl IntentCatalog {
    pub fn new(
        selector: AvatarSelector,
        standard: Vec<IntentDefinition>,
        custom: Vec<IntentDefinition>,
    ) -> Result<Self, ConfigurationError> {
        validate_intent_definitions(&standard)?;
        validate_intent_definitions(&custom)?;

        let mut intents = standard;
        for def in custom {
            match intents.iter_mut().find(|i| i.name == def.name) {
                Some(existing) => *existing = def,
                None => intents.push(def),
            }
        }
        Ok(Self { selector, intents })
    }

    pub fn selector(&self) -> &AvatarSelector {
        &self.selector
    }

    pub fn get(&self, name: &str) -> Option<&IntentDefinition> {
        self.intents.iter().find(|i| i.name == name)
    }

    /// Case-insensitive lookup used for provider answers.
    pub fn find_ignore_case(&self, name: &str) -> Option<&IntentDefinition> {
        self.intents
            .iter()
            .find(|i| i.name.eq_ignore_ascii_case(name))
    }

    /// First intent, in set order, with a keyword contained in `message`.
    pub fn keyword_match(&self, message: &str) -> Option<&IntentDefinition> {
        let lower = message.to_lowercase();
        self.intents.iter().find(|i| i.matches_keywords(&lower))
    }

    pub fn iter(&self) -> impl Iterator<Item = &IntentDefinition> {
        self.intents.iter()
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(standard: Vec<IntentDefinition>, custom: Vec<IntentDefinition>) -> IntentCatalog {
        IntentCatalog::new(AvatarSelector::standard("sales"), standard, custom).unwrap()
    }

    #[test]
    fn test_keyword_match_first_in_order_wins() {
        let catalog = catalog(
            vec![
                IntentDefinition::new("pricing_question", &["price", "cost"]),
                IntentDefinition::new("discount_request", &["price"]),
            ],
            vec![],
        );
        let hit = catalog.keyword_match("What's the PRICE?").unwrap();
        assert_eq!(hit.name, "pricing_question");
        assert!(catalog.keyword_match("good morning").is_none());
    }

    #[test]
    fn test_custom_appends_and_overrides() {
        let catalog = catalog(
            vec![
                IntentDefinition::new("greeting", &["hello"]),
                IntentDefinition::new("pricing_question", &["price"]),
            ],
            vec![
                IntentDefinition::new("greeting", &["howdy"]),
                IntentDefinition::new("warranty", &["warranty"]),
            ],
        );
        let names: Vec<&str> = catalog.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["greeting", "pricing_question", "warranty"]);
        assert_eq!(catalog.keyword_match("howdy").unwrap().name, "greeting");
        assert!(catalog.keyword_match("hello").is_none());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = IntentCatalog::new(
            AvatarSelector::standard("sales"),
            vec![
                IntentDefinition::new("greeting", &[]),
                IntentDefinition::new("greeting", &[]),
            ],
            vec![],
        );
        assert!(matches!(result, Err(ConfigurationError::Validation(_))));
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let mut def = IntentDefinition::new("greeting", &[]);
        def.confidence_threshold = 1.5;
        assert!(validate_intent_definitions(&[def]).is_err());
    }

    #[test]
    fn test_out_of_range_max_age_rejected() {
        let mut def = IntentDefinition::new("goodbye", &[]);
        def.max_age_secs = Some(u64::MAX);
        let err = validate_intent_definitions(&[def]).unwrap_err();
        assert!(err.to_string().contains("max_age_secs"));
    }

    #[test]
    fn test_find_ignore_case() {
        let catalog = catalog(vec![IntentDefinition::new("pricing_question", &[])], vec![]);
        assert!(catalog.find_ignore_case("Pricing_Question").is_some());
        assert!(catalog.get("Pricing_Question").is_none());
    }
}
