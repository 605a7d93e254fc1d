//! Step advancement rules.
//!
//! Each flow (or individual step) names the rule that decides whether the
//! user's latest message completes the current step. Rules are looked up by
//! name in an `AdvancementRegistry`; unknown names are configuration errors
//! caught when definitions are loaded.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, LazyLock};

use mindstack_types::error::ConfigurationError;
use mindstack_types::flow::{FlowExecution, FlowStep};
use regex::Regex;

use crate::flow::definition::FlowCatalog;

/// Rule applied when neither the step nor the flow names one.
pub const DEFAULT_RULE: &str = "answered";

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("valid email regex")
});

/// Inputs available to a rule.
#[derive(Debug, Clone, Copy)]
pub struct AdvanceContext<'a> {
    pub message: &'a str,
    pub intent: &'a str,
    pub step: &'a FlowStep,
    pub execution: &'a FlowExecution,
}

/// Outcome of evaluating a rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvanceDecision {
    pub advance: bool,
    /// Values to merge into the execution context.
    pub captured: BTreeMap<String, String>,
}

impl AdvanceDecision {
    pub fn stay() -> Self {
        Self::default()
    }

    pub fn advance() -> Self {
        Self {
            advance: true,
            captured: BTreeMap::new(),
        }
    }
}

/// A named predicate deciding whether the current step is done.
pub trait StepAdvancement: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&self, ctx: &AdvanceContext<'_>) -> AdvanceDecision;
}

/// Treats a reply as an answer when it is not a question and has at least
/// `min_words` words. A reply carrying one of the keywords needs only
/// `keyword_min_words`, so a bare "yes" or "no" never advances.
pub struct AnsweredHeuristic {
    pub min_words: usize,
    pub keyword_min_words: usize,
    pub keywords: Vec<String>,
}

impl Default for AnsweredHeuristic {
    fn default() -> Self {
        Self {
            min_words: 3,
            keyword_min_words: 2,
            keywords: ["need", "problem", "have", "want"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

const QUESTION_WORDS: &[&str] = &["what", "how", "why", "when", "where", "who", "which"];

impl StepAdvancement for AnsweredHeuristic {
    fn name(&self) -> &str {
        "answered"
    }

    fn evaluate(&self, ctx: &AdvanceContext<'_>) -> AdvanceDecision {
        let text = ctx.message.trim();
        if text.is_empty() || text.ends_with('?') {
            return AdvanceDecision::stay();
        }
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|w| !w.is_empty())
            .collect();
        if words.first().is_some_and(|w| QUESTION_WORDS.contains(w)) {
            return AdvanceDecision::stay();
        }
        let has_keyword = self.keywords.iter().any(|k| words.contains(&k.as_str()));
        let needed = if has_keyword {
            self.keyword_min_words
        } else {
            self.min_words
        };
        if words.len() >= needed {
            AdvanceDecision::advance()
        } else {
            AdvanceDecision::stay()
        }
    }
}

/// Advances once the message contains an email address, capturing it as `email`.
pub struct EmailCapture;

impl StepAdvancement for EmailCapture {
    fn name(&self) -> &str {
        "email_capture"
    }

    fn evaluate(&self, ctx: &AdvanceContext<'_>) -> AdvanceDecision {
        match EMAIL_PATTERN.find(ctx.message) {
            Some(m) => {
                let mut decision = AdvanceDecision::advance();
                decision
                    .captured
                    .insert("email".to_string(), m.as_str().to_string());
                decision
            }
            None => AdvanceDecision::stay(),
        }
    }
}

/// Advances on every message.
pub struct AlwaysAdvance;

impl StepAdvancement for AlwaysAdvance {
    fn name(&self) -> &str {
        "always"
    }

    fn evaluate(&self, _ctx: &AdvanceContext<'_>) -> AdvanceDecision {
        AdvanceDecision::advance()
    }
}

/// Never advances on its own; the step is completed by an explicit
/// `progress_flow` call.
pub struct ManualAdvance;

impl StepAdvancement for ManualAdvance {
    fn name(&self) -> &str {
        "manual"
    }

    fn evaluate(&self, _ctx: &AdvanceContext<'_>) -> AdvanceDecision {
        AdvanceDecision::stay()
    }
}

/// Rules by name.
#[derive(Clone)]
pub struct AdvancementRegistry {
    rules: HashMap<String, Arc<dyn StepAdvancement>>,
}

impl AdvancementRegistry {
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Registry holding `answered`, `email_capture`, `always` and `manual`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(AnsweredHeuristic::default()));
        registry.register(Arc::new(EmailCapture));
        registry.register(Arc::new(AlwaysAdvance));
        registry.register(Arc::new(ManualAdvance));
        registry
    }

    /// Add or replace a rule under its own name.
    pub fn register(&mut self, rule: Arc<dyn StepAdvancement>) {
        self.rules.insert(rule.name().to_string(), rule);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn StepAdvancement>, ConfigurationError> {
        self.rules
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigurationError::UnknownAdvancementRule(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Fail if `catalog` names a rule that is not registered.
    pub fn check_catalog(&self, catalog: &FlowCatalog) -> Result<(), ConfigurationError> {
        for rule in catalog.referenced_rules() {
            if !self.contains(rule) {
                return Err(ConfigurationError::UnknownAdvancementRule(rule.to_string()));
            }
        }
        Ok(())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for AdvancementRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
