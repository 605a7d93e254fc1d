//! Intent classification.
//!
//! `IntentClassifier` turns a raw user message into one intent name from the
//! active catalog. When a provider is configured it asks the model for a
//! single name; otherwise, or when that call fails, it falls back to
//! deterministic keyword matching. Classification never fails the turn.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use mindstack_types::config::EngineConfig;
use mindstack_types::intent::{ClassificationSource, IntentClassification, IntentDefinition};
use mindstack_types::llm::CompletionRequest;
use mindstack_types::memory::MindStateStack;
use tracing::{Instrument, debug, info_span, warn};

use crate::intent::catalog::IntentCatalog;
use crate::llm::BoxLlmProvider;

/// Instruction sent ahead of the intent list.
const CLASSIFICATION_SYSTEM_PROMPT: &str = "\
You classify a user's message into exactly one intent from the list below.
Reply with the intent name only: no punctuation, no explanation.
If nothing fits, reply with the closest general intent.";

/// Tunables copied out of `EngineConfig`.
#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub general_question_intent: String,
    pub uncategorized_intent: String,
    pub provider_confidence: f32,
    pub unknown_name_confidence: f32,
    pub keyword_confidence: f32,
    pub fallback_confidence: f32,
    pub max_tokens: u32,
    pub temperature: f64,
    pub history_depth: usize,
    pub continuation_window: TimeDelta,
}

impl ClassifierSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            general_question_intent: config.general_question_intent.clone(),
            uncategorized_intent: config.uncategorized_intent.clone(),
            provider_confidence: config.provider_confidence,
            unknown_name_confidence: config.unknown_name_confidence,
            keyword_confidence: config.keyword_confidence,
            fallback_confidence: config.fallback_confidence,
            max_tokens: config.classifier_max_tokens,
            temperature: config.classifier_temperature,
            history_depth: config.history_depth,
            continuation_window: config.continuation_window(),
        }
    }
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

pub struct IntentClassifier {
    provider: Option<Arc<BoxLlmProvider>>,
    settings: ClassifierSettings,
}

impl IntentClassifier {
    pub fn new(provider: Option<Arc<BoxLlmProvider>>, settings: ClassifierSettings) -> Self {
        Self { provider, settings }
    }

    /// Keyword matching only.
    pub fn keyword_only(settings: ClassifierSettings) -> Self {
        Self::new(None, settings)
    }

    pub fn settings(&self) -> &ClassifierSettings {
        &self.settings
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    /// Classify `message` against `catalog`, using `memory` for context and
    /// continuation detection.
    #[tracing::instrument(
        name = "intent.classify",
        skip(self, message, memory, catalog),
        fields(
            avatar = %catalog.selector(),
            message_len = message.len(),
            has_memory = memory.is_some(),
        )
    )]
    pub async fn classify(
        &self,
        message: &str,
        memory: Option<&MindStateStack>,
        catalog: &IntentCatalog,
    ) -> IntentClassification {
        let (intent, confidence, source) = match &self.provider {
            Some(provider) => self.classify_with_provider(provider, message, memory, catalog).await,
            None => self.classify_by_keywords(message, catalog),
        };
        let (intent, confidence, source) = self.apply_threshold(intent, confidence, source, catalog);

        let definition = catalog.get(&intent);
        let is_continuation = memory.is_some_and(|m| {
            m.is_continuation(&intent, Utc::now(), self.settings.continuation_window)
        });

        debug!(
            intent = %intent,
            confidence,
            source = %source,
            is_continuation,
            "Classified message"
        );

        IntentClassification {
            requires_flow: definition.is_some_and(|d| d.requires_flow),
            flow_name: definition.and_then(|d| d.flow_name.clone()),
            intent,
            confidence,
            is_continuation,
            source,
        }
    }

    /// An intent scored below its own `confidence_threshold` drops to the
    /// general-question intent. The fallback intents are never downgraded.
    fn apply_threshold(
        &self,
        intent: String,
        confidence: f32,
        source: ClassificationSource,
        catalog: &IntentCatalog,
    ) -> (String, f32, ClassificationSource) {
        let is_fallback = intent == self.settings.general_question_intent
            || intent == self.settings.uncategorized_intent;
        let threshold = catalog.get(&intent).map(|d| d.confidence_threshold);
        match threshold {
            Some(threshold) if !is_fallback && confidence < threshold => {
                debug!(intent = %intent, confidence, threshold, "Below confidence threshold");
                (
                    self.settings.general_question_intent.clone(),
                    self.settings.fallback_confidence,
                    ClassificationSource::DefaultFallback,
                )
            }
            _ => (intent, confidence, source),
        }
    }

    /// Deterministic fallback: first keyword hit in set order, else the
    /// general-question intent.
    pub fn classify_by_keywords(
        &self,
        message: &str,
        catalog: &IntentCatalog,
    ) -> (String, f32, ClassificationSource) {
        match catalog.keyword_match(message) {
            Some(def) => (
                def.name.clone(),
                self.settings.keyword_confidence,
                ClassificationSource::KeywordMatch,
            ),
            None => (
                self.settings.general_question_intent.clone(),
                self.settings.fallback_confidence,
                ClassificationSource::DefaultFallback,
            ),
        }
    }

    async fn classify_with_provider(
        &self,
        provider: &BoxLlmProvider,
        message: &str,
        memory: Option<&MindStateStack>,
        catalog: &IntentCatalog,
    ) -> (String, f32, ClassificationSource) {
        let request = CompletionRequest::simple(
            build_classification_prompt(catalog.iter()),
            build_classification_input(message, memory, self.settings.history_depth),
            self.settings.max_tokens,
        )
        .with_temperature(self.settings.temperature);

        let span = info_span!(
            "gen_ai.classify",
            gen_ai.system = provider.name(),
            gen_ai.request.model = provider.model(),
            gen_ai.request.max_tokens = request.max_tokens,
            gen_ai.request.temperature = ?request.temperature,
        );

        match provider.complete(&request).instrument(span).await {
            Ok(response) => {
                let candidate = normalize_intent_name(&response.content);
                match catalog.find_ignore_case(&candidate) {
                    Some(def) => (
                        def.name.clone(),
                        self.settings.provider_confidence,
                        ClassificationSource::Provider,
                    ),
                    None => {
                        warn!(
                            returned = %candidate,
                            fallback = %self.settings.uncategorized_intent,
                            "Provider returned an unknown intent name"
                        );
                        (
                            self.settings.uncategorized_intent.clone(),
                            self.settings.unknown_name_confidence,
                            ClassificationSource::ProviderUnknownName,
                        )
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "Intent classification call failed; using keyword matching");
                self.classify_by_keywords(message, catalog)
            }
        }
    }
}

/// System prompt listing every intent with its description and examples.
pub fn build_classification_prompt<'a>(
    intents: impl Iterator<Item = &'a IntentDefinition>,
) -> String {
    let mut prompt = String::from(CLASSIFICATION_SYSTEM_PROMPT);
    prompt.push_str("\n\nIntents:\n");
    for def in intents {
        prompt.push_str("- ");
        prompt.push_str(&def.name);
        if !def.description.is_empty() {
            prompt.push_str(": ");
            prompt.push_str(&def.description);
        }
        if !def.examples.is_empty() {
            prompt.push_str(" (e.g. ");
            let examples: Vec<String> = def.examples.iter().map(|e| format!("\"{e}\"")).collect();
            prompt.push_str(&examples.join(", "));
            prompt.push(')');
        }
        prompt.push('\n');
    }
    prompt
}

/// User text: the message plus up to `depth` recent intents, oldest first.
pub fn build_classification_input(
    message: &str,
    memory: Option<&MindStateStack>,
    depth: usize,
) -> String {
    let recent: Vec<&str> = memory
        .map(|m| m.recent(depth).iter().map(|i| i.intent.as_str()).collect())
        .unwrap_or_default();
    if recent.is_empty() {
        format!("Message: {message}")
    } else {
        format!("Recent intents: {}\nMessage: {message}", recent.join(", "))
    }
}

/// First non-empty line, stripped of quotes, backticks and trailing punctuation.
fn normalize_intent_name(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("")
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.' || c == ',')
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;
    use mindstack_types::avatar::AvatarSelector;
    use mindstack_types::intent::IntentPolicy;
    use std::collections::BTreeMap;

    fn catalog() -> IntentCatalog {
        let mut demo = IntentDefinition::new("demo_request", &["demo"]);
        demo.requires_flow = true;
        demo.flow_name = Some("demo_flow".to_string());
        demo.description = "User wants a product demo".to_string();
        demo.examples = vec!["can I see a demo".to_string()];
        IntentCatalog::new(
            AvatarSelector::standard("sales"),
            vec![
                IntentDefinition::new("greeting", &["hello", "hi there"]),
                IntentDefinition::new("pricing_question", &["price", "cost"]),
                demo,
            ],
            vec![],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_keyword_fallback_without_provider() {
        let classifier = IntentClassifier::keyword_only(ClassifierSettings::default());
        let result = classifier
            .classify("What's the price?", None, &catalog())
            .await;
        assert_eq!(result.intent, "pricing_question");
        assert!((result.confidence - 0.9).abs() < f32::EPSILON);
        assert_eq!(result.source, ClassificationSource::KeywordMatch);
        assert!(!result.is_continuation);
    }

    #[tokio::test]
    async fn test_no_match_yields_general_question() {
        let classifier = IntentClassifier::keyword_only(ClassifierSettings::default());
        let result = classifier.classify("tell me more", None, &catalog()).await;
        assert_eq!(result.intent, "general_question");
        assert!((result.confidence - 0.3).abs() < f32::EPSILON);
        assert_eq!(result.source, ClassificationSource::DefaultFallback);
    }

    #[tokio::test]
    async fn test_provider_answer_used() {
        let provider = ScriptedProvider::replying(&["demo_request"]);
        let calls = provider.calls();
        let classifier = IntentClassifier::new(
            Some(Arc::new(BoxLlmProvider::new(provider))),
            ClassifierSettings::default(),
        );
        let result = classifier.classify("could we see it live", None, &catalog()).await;
        assert_eq!(result.intent, "demo_request");
        assert_eq!(result.source, ClassificationSource::Provider);
        assert!(result.requires_flow);
        assert_eq!(result.flow_name.as_deref(), Some("demo_flow"));
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_answer_below_intent_threshold_falls_back() {
        let mut demo = IntentDefinition::new("demo_request", &["demo"]);
        demo.confidence_threshold = 0.95;
        let catalog = IntentCatalog::new(AvatarSelector::standard("sales"), vec![demo], vec![]).unwrap();
        let classifier = IntentClassifier::new(
            Some(Arc::new(BoxLlmProvider::new(ScriptedProvider::replying(&["demo_request"])))),
            ClassifierSettings::default(),
        );

        let result = classifier.classify("could we see it live", None, &catalog).await;
        assert_eq!(result.intent, "general_question");
        assert!((result.confidence - 0.3).abs() < f32::EPSILON);
        assert_eq!(result.source, ClassificationSource::DefaultFallback);
        assert!(!result.requires_flow);

        // Keyword matches score 0.9, also below 0.95.
        let keyword_only = IntentClassifier::keyword_only(ClassifierSettings::default());
        let result = keyword_only.classify("show me a demo", None, &catalog).await;
        assert_eq!(result.intent, "general_question");
    }

    #[tokio::test]
    async fn test_provider_unknown_name_downgraded() {
        let provider = ScriptedProvider::replying(&["weather_chat"]);
        let classifier = IntentClassifier::new(
            Some(Arc::new(BoxLlmProvider::new(provider))),
            ClassifierSettings::default(),
        );
        let result = classifier.classify("nice weather", None, &catalog()).await;
        assert_eq!(result.intent, "uncategorized_comment");
        assert!((result.confidence - 0.5).abs() < f32::EPSILON);
        assert_eq!(result.source, ClassificationSource::ProviderUnknownName);
    }

    #[tokio::test]
    async fn test_provider_failure_falls_back_to_keywords() {
        let provider = ScriptedProvider::failing();
        let classifier = IntentClassifier::new(
            Some(Arc::new(BoxLlmProvider::new(provider))),
            ClassifierSettings::default(),
        );
        let result = classifier.classify("hello!", None, &catalog()).await;
        assert_eq!(result.intent, "greeting");
        assert_eq!(result.source, ClassificationSource::KeywordMatch);
    }

    #[tokio::test]
    async fn test_provider_answer_is_normalized() {
        let provider = ScriptedProvider::replying(&["  \"Pricing_Question\".\nbecause..."]);
        let classifier = IntentClassifier::new(
            Some(Arc::new(BoxLlmProvider::new(provider))),
            ClassifierSettings::default(),
        );
        let result = classifier.classify("how much", None, &catalog()).await;
        assert_eq!(result.intent, "pricing_question");
    }

    #[tokio::test]
    async fn test_prompt_carries_recent_intents() {
        let provider = ScriptedProvider::replying(&["greeting"]);
        let calls = provider.calls();
        let classifier = IntentClassifier::new(
            Some(Arc::new(BoxLlmProvider::new(provider))),
            ClassifierSettings::default(),
        );
        let now = Utc::now();
        let mut memory = MindStateStack::new("s1", now);
        for intent in ["a", "b", "c", "d"] {
            memory.push(intent, 0.9, BTreeMap::new(), &IntentPolicy::default(), now);
        }
        classifier.classify("hi", Some(&memory), &catalog()).await;

        let calls = calls.lock().unwrap();
        let request = &calls[0];
        assert!(request.messages[0].content.contains("Recent intents: b, c, d"));
        let system = request.system.as_deref().unwrap();
        assert!(system.contains("- demo_request: User wants a product demo"));
        assert!(system.contains("\"can I see a demo\""));
        assert_eq!(request.max_tokens, 50);
        assert_eq!(request.temperature, Some(0.1));
    }

    #[tokio::test]
    async fn test_continuation_detection() {
        let classifier = IntentClassifier::keyword_only(ClassifierSettings::default());
        let now = Utc::now();

        let mut recent = MindStateStack::new("s1", now);
        recent.push(
            "pricing_question",
            0.9,
            BTreeMap::new(),
            &IntentPolicy::default(),
            now - TimeDelta::seconds(5),
        );
        let result = classifier.classify("and the cost?", Some(&recent), &catalog()).await;
        assert!(result.is_continuation);

        let mut stale = MindStateStack::new("s1", now);
        stale.push(
            "pricing_question",
            0.9,
            BTreeMap::new(),
            &IntentPolicy::default(),
            now - TimeDelta::seconds(40),
        );
        let result = classifier.classify("and the cost?", Some(&stale), &catalog()).await;
        assert!(!result.is_continuation);
    }

    #[tokio::test]
    async fn test_empty_custom_set_still_classifies() {
        let catalog = IntentCatalog::new(AvatarSelector::custom("sales", "ghost"), vec![], vec![])
            .unwrap();
        let classifier = IntentClassifier::keyword_only(ClassifierSettings::default());
        let result = classifier.classify("price?", None, &catalog).await;
        assert_eq!(result.intent, "general_question");
    }
}
