//! Engine configuration types for Mindstack.
//!
//! `EngineConfig` represents `config.toml` in the data directory. Every field
//! has a default so an empty or missing file yields a working engine.

use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::avatar::AvatarProfile;

/// Largest number of seconds a `TimeDelta` can represent.
pub const MAX_DURATION_SECS: u64 = (i64::MAX / 1000) as u64;

/// Convert a configured number of seconds, saturating at `TimeDelta::MAX`.
pub fn secs_to_delta(secs: u64) -> TimeDelta {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}

/// Top-level configuration for the orchestration engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Prepended to every assembled system prompt when set.
    #[serde(default)]
    pub default_system_prompt: Option<String>,

    /// Avatar selector used when none is given (`type` or `type/custom_id`).
    #[serde(default = "default_avatar")]
    pub default_avatar: String,

    /// Intent used when nothing else matches, and for gated intents.
    #[serde(default = "default_general_question_intent")]
    pub general_question_intent: String,

    /// Intent used when the provider answers with an unknown name.
    #[serde(default = "default_uncategorized_intent")]
    pub uncategorized_intent: String,

    #[serde(default = "default_provider_confidence")]
    pub provider_confidence: f32,

    #[serde(default = "default_unknown_name_confidence")]
    pub unknown_name_confidence: f32,

    #[serde(default = "default_keyword_confidence")]
    pub keyword_confidence: f32,

    #[serde(default = "default_fallback_confidence")]
    pub fallback_confidence: f32,

    #[serde(default = "default_classifier_max_tokens")]
    pub classifier_max_tokens: u32,

    #[serde(default = "default_classifier_temperature")]
    pub classifier_temperature: f64,

    /// Number of recent stack intents sent to the classifier and shown in prompts.
    #[serde(default = "default_history_depth")]
    pub history_depth: usize,

    #[serde(default = "default_continuation_window_secs")]
    pub continuation_window_secs: u64,

    /// Stack items older than this are dropped by the sweeper.
    #[serde(default = "default_memory_retention_secs")]
    pub memory_retention_secs: u64,

    /// Active flows untouched for this long are timed out by the sweeper.
    #[serde(default = "default_flow_idle_timeout_secs")]
    pub flow_idle_timeout_secs: u64,

    /// Cached session memories untouched for this long are evicted.
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    #[serde(default)]
    pub counterpart: CounterpartDefaults,

    /// Persona substituted into templates.
    #[serde(default)]
    pub avatar: AvatarProfile,

    /// Classification/generation provider. Absent means keyword matching only.
    #[serde(default)]
    pub provider: Option<ProviderSettings>,
}

fn default_avatar() -> String {
    "sales".to_string()
}
fn default_general_question_intent() -> String {
    "general_question".to_string()
}
fn default_uncategorized_intent() -> String {
    "uncategorized_comment".to_string()
}
fn default_provider_confidence() -> f32 {
    0.85
}
fn default_unknown_name_confidence() -> f32 {
    0.5
}
fn default_keyword_confidence() -> f32 {
    0.9
}
fn default_fallback_confidence() -> f32 {
    0.3
}
fn default_classifier_max_tokens() -> u32 {
    50
}
fn default_classifier_temperature() -> f64 {
    0.1
}
fn default_history_depth() -> usize {
    3
}
fn default_continuation_window_secs() -> u64 {
    30
}
fn default_memory_retention_secs() -> u64 {
    3600
}
fn default_flow_idle_timeout_secs() -> u64 {
    1800
}
fn default_session_idle_secs() -> u64 {
    3600
}
fn default_sweep_interval_secs() -> u64 {
    300
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_system_prompt: None,
            default_avatar: default_avatar(),
            general_question_intent: default_general_question_intent(),
            uncategorized_intent: default_uncategorized_intent(),
            provider_confidence: default_provider_confidence(),
            unknown_name_confidence: default_unknown_name_confidence(),
            keyword_confidence: default_keyword_confidence(),
            fallback_confidence: default_fallback_confidence(),
            classifier_max_tokens: default_classifier_max_tokens(),
            classifier_temperature: default_classifier_temperature(),
            history_depth: default_history_depth(),
            continuation_window_secs: default_continuation_window_secs(),
            memory_retention_secs: default_memory_retention_secs(),
            flow_idle_timeout_secs: default_flow_idle_timeout_secs(),
            session_idle_secs: default_session_idle_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            counterpart: CounterpartDefaults::default(),
            avatar: AvatarProfile::default(),
            provider: None,
        }
    }
}

impl EngineConfig {
    pub fn continuation_window(&self) -> TimeDelta {
        secs_to_delta(self.continuation_window_secs)
    }

    pub fn memory_retention(&self) -> TimeDelta {
        secs_to_delta(self.memory_retention_secs)
    }

    pub fn flow_idle_timeout(&self) -> TimeDelta {
        secs_to_delta(self.flow_idle_timeout_secs)
    }

    pub fn session_idle(&self) -> TimeDelta {
        secs_to_delta(self.session_idle_secs)
    }

    /// Sweep period, never shorter than one second.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Values substituted for counterpart placeholders when the profile has none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterpartDefaults {
    #[serde(default = "default_counterpart_name")]
    pub name: String,
    #[serde(default = "default_counterpart_company")]
    pub company: String,
    #[serde(default = "default_counterpart_role")]
    pub role: String,
}

fn default_counterpart_name() -> String {
    "there".to_string()
}
fn default_counterpart_company() -> String {
    "your company".to_string()
}
fn default_counterpart_role() -> String {
    "your role".to_string()
}

impl Default for CounterpartDefaults {
    fn default() -> Self {
        Self {
            name: default_counterpart_name(),
            company: default_counterpart_company(),
            role: default_counterpart_role(),
        }
    }
}

/// OpenAI-compatible endpoint used for classification and generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_provider_name")]
    pub name: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_generation_max_tokens")]
    pub generation_max_tokens: u32,
    #[serde(default = "default_generation_temperature")]
    pub generation_temperature: f64,
}

impl ProviderSettings {
    /// Settings for `model` with every other field at its default.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            name: default_provider_name(),
            base_url: default_base_url(),
            model: model.into(),
            api_key_env: default_api_key_env(),
            generation_max_tokens: default_generation_max_tokens(),
            generation_temperature: default_generation_temperature(),
        }
    }
}

fn default_provider_name() -> String {
    "openai".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_generation_max_tokens() -> u32 {
    1024
}
fn default_generation_temperature() -> f64 {
    0.7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default_values() {
        let config = EngineConfig::default();
        assert_eq!(config.general_question_intent, "general_question");
        assert_eq!(config.uncategorized_intent, "uncategorized_comment");
        assert!((config.keyword_confidence - 0.9).abs() < f32::EPSILON);
        assert!((config.fallback_confidence - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.continuation_window(), TimeDelta::seconds(30));
        assert_eq!(config.memory_retention(), TimeDelta::seconds(3600));
        assert_eq!(config.flow_idle_timeout(), TimeDelta::seconds(1800));
        assert!(config.provider.is_none());
    }

    #[test]
    fn test_engine_config_empty_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config.default_avatar, "sales");
        assert_eq!(config.history_depth, 3);
        assert_eq!(config.counterpart.name, "there");
    }

    #[test]
    fn test_engine_config_deserialize_with_values() {
        let toml_str = r#"
default_system_prompt = "You are helpful."
default_avatar = "support/acme"
continuation_window_secs = 10

[counterpart]
name = "friend"

[avatar]
name = "Ava"
company_name = "Acme"
specializations = ["widgets"]

[provider]
model = "gpt-4o-mini"
base_url = "http://localhost:11434/v1"
"#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.default_system_prompt.as_deref(), Some("You are helpful."));
        assert_eq!(config.default_avatar, "support/acme");
        assert_eq!(config.continuation_window_secs, 10);
        assert_eq!(config.counterpart.name, "friend");
        assert_eq!(config.counterpart.company, "your company");
        assert_eq!(config.avatar.name, "Ava");
        assert_eq!(config.avatar.specializations, vec!["widgets".to_string()]);

        let provider = config.provider.unwrap();
        assert_eq!(provider.name, "openai");
        assert_eq!(provider.model, "gpt-4o-mini");
        assert_eq!(provider.api_key_env, "OPENAI_API_KEY");
        assert_eq!(provider.generation_max_tokens, 1024);
    }

    #[test]
    fn test_secs_to_delta_saturates() {
        assert_eq!(secs_to_delta(90), TimeDelta::seconds(90));
        assert_eq!(secs_to_delta(MAX_DURATION_SECS).num_seconds(), MAX_DURATION_SECS as i64);
        assert_eq!(secs_to_delta(MAX_DURATION_SECS + 1), TimeDelta::MAX);
        assert_eq!(secs_to_delta(u64::MAX), TimeDelta::MAX);
    }

    #[test]
    fn test_huge_windows_do_not_panic() {
        let config = EngineConfig {
            continuation_window_secs: u64::MAX,
            memory_retention_secs: 100_000_000_000_000_000,
            ..EngineConfig::default()
        };
        assert_eq!(config.continuation_window(), TimeDelta::MAX);
        assert_eq!(config.memory_retention(), TimeDelta::MAX);
    }

    #[test]
    fn test_sweep_interval_floor() {
        let config = EngineConfig {
            sweep_interval_secs: 0,
            ..EngineConfig::default()
        };
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));
    }
}
