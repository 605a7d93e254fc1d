//! Intent definition and classification types for Mindstack.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

fn default_true() -> bool {
    true
}

fn default_confidence_threshold() -> f32 {
    0.5
}

/// Static description of one intent an avatar understands.
///
/// Loaded from the per-avatar `intents.yaml` document and never mutated at
/// runtime; the active set is replaced wholesale on avatar switch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub requires_flow: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_name: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_true")]
    pub repeatable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age_secs: Option<u64>,
}

impl IntentDefinition {
    /// Minimal definition with the given name and keywords.
    pub fn new(name: impl Into<String>, keywords: &[&str]) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            examples: Vec::new(),
            requires_flow: false,
            flow_name: None,
            priority: 0,
            confidence_threshold: default_confidence_threshold(),
            repeatable: true,
            max_age_secs: None,
        }
    }

    /// Fulfillment policy carried into the session memory on push.
    pub fn policy(&self) -> IntentPolicy {
        IntentPolicy {
            repeatable: self.repeatable,
            max_age_secs: self.max_age_secs,
        }
    }

    /// Case-insensitive substring match of any keyword against `message`.
    ///
    /// `message_lower` must already be lowercased.
    pub fn matches_keywords(&self, message_lower: &str) -> bool {
        self.keywords
            .iter()
            .filter(|k| !k.trim().is_empty())
            .any(|k| message_lower.contains(&k.to_lowercase()))
    }
}

/// Repeatability rules applied to a fulfillment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntentPolicy {
    pub repeatable: bool,
    pub max_age_secs: Option<u64>,
}

impl Default for IntentPolicy {
    fn default() -> Self {
        Self {
            repeatable: true,
            max_age_secs: None,
        }
    }
}

/// Where a classification result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    /// The provider returned a known intent name.
    Provider,
    /// The provider returned a name outside the active set.
    ProviderUnknownName,
    /// Keyword fallback found a match.
    KeywordMatch,
    /// Keyword fallback found nothing.
    DefaultFallback,
}

impl fmt::Display for ClassificationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassificationSource::Provider => write!(f, "provider"),
            ClassificationSource::ProviderUnknownName => write!(f, "provider_unknown_name"),
            ClassificationSource::KeywordMatch => write!(f, "keyword_match"),
            ClassificationSource::DefaultFallback => write!(f, "default_fallback"),
        }
    }
}

impl FromStr for ClassificationSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "provider" => Ok(ClassificationSource::Provider),
            "provider_unknown_name" => Ok(ClassificationSource::ProviderUnknownName),
            "keyword_match" => Ok(ClassificationSource::KeywordMatch),
            "default_fallback" => Ok(ClassificationSource::DefaultFallback),
            other => Err(format!("invalid classification source: '{other}'")),
        }
    }
}

/// Result of classifying one user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentClassification {
    pub intent: String,
    pub confidence: f32,
    pub requires_flow: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_name: Option<String>,
    pub is_continuation: bool,
    pub source: ClassificationSource,
}

impl IntentClassification {
    /// Replace the intent with a fallback one, clearing flow hints.
    pub fn downgrade(&mut self, intent: impl Into<String>, confidence: f32) {
        self.intent = intent.into();
        self.confidence = confidence;
        self.requires_flow = false;
        self.flow_name = None;
        self.is_continuation = false;
    }
}
