//! LLM provider implementations.
//!
//! Contains the OpenAI-compatible implementation of the [`LlmProvider`]
//! trait defined in `mindstack-core`, a factory ([`create_provider`]) that
//! builds it from [`ProviderSettings`], and a connectivity check
//! ([`test_provider_connection`]).
//!
//! [`LlmProvider`]: mindstack_core::llm::LlmProvider

pub mod openai_compat;

use secrecy::SecretString;

use mindstack_core::llm::BoxLlmProvider;
use mindstack_types::config::ProviderSettings;
use mindstack_types::llm::{CompletionRequest, LlmError};

use self::openai_compat::OpenAiCompatibleProvider;
use self::openai_compat::config::OpenAiCompatConfig;

/// Read the API key named by `settings.api_key_env`.
///
/// An empty `api_key_env` means the endpoint needs no key (e.g. a local
/// Ollama server); a placeholder is used so the client still sends a header.
pub fn resolve_api_key(settings: &ProviderSettings) -> Option<SecretString> {
    if settings.api_key_env.is_empty() {
        return Some(SecretString::from("unused".to_string()));
    }
    std::env::var(&settings.api_key_env)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .map(SecretString::from)
}

/// Create a [`BoxLlmProvider`] from [`ProviderSettings`].
///
/// # Errors
///
/// Returns [`LlmError::AuthenticationFailed`] when no API key is available.
pub fn create_provider(
    settings: &ProviderSettings,
    api_key: Option<SecretString>,
) -> Result<BoxLlmProvider, LlmError> {
    let key = api_key.ok_or(LlmError::AuthenticationFailed)?;
    let provider = OpenAiCompatibleProvider::new(OpenAiCompatConfig::from_settings(settings, key));
    tracing::debug!(
        provider = %settings.name,
        model = %settings.model,
        base_url = %settings.base_url,
        "Created LLM provider"
    );
    Ok(BoxLlmProvider::new(provider))
}

/// Test provider connectivity by sending a minimal completion request.
pub async fn test_provider_connection(provider: &BoxLlmProvider) -> Result<(), LlmError> {
    let request = CompletionRequest::simple("Reply with OK.", "Hello", 10).with_temperature(0.0);
    provider.complete(&request).await?;
    Ok(())
}
