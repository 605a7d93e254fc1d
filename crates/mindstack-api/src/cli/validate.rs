//! `mindstack validate`: load an avatar's definitions and report problems.
//!
//! Runs without the database so broken definitions can be diagnosed even
//! though the engine refuses to start with them.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use mindstack_core::definitions::DefinitionSet;
use mindstack_core::flow::AdvancementRegistry;
use mindstack_infra::config::load_engine_config;
use mindstack_infra::definitions::FileDefinitionSource;
use mindstack_infra::filesystem::DataLayout;
use mindstack_infra::llm::{create_provider, resolve_api_key, test_provider_connection};
use mindstack_types::avatar::AvatarSelector;
use mindstack_types::config::EngineConfig;

/// Problems that do not stop the engine from loading but will surface as
/// fallbacks or failed turns.
pub fn lint(set: &DefinitionSet, config: &EngineConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    for fallback in [&config.general_question_intent, &config.uncategorized_intent] {
        if set.intents.get(fallback).is_none() {
            warnings.push(format!("fallback intent '{fallback}' is not defined"));
        }
    }

    for intent in set.intents.iter() {
        if set.templates.for_intent(&intent.name).is_none() {
            warnings.push(format!("intent '{}' has no prompt template", intent.name));
        }
        if intent.requires_flow && set.flows.find_by_entry_intent(&intent.name).is_none() {
            warnings.push(format!(
                "intent '{}' requires a flow but no flow lists it as an entry intent",
                intent.name
            ));
        }
    }

    for flow in set.flows.iter() {
        for entry in &flow.entry_intents {
            if set.intents.get(entry).is_none() {
                warnings.push(format!(
                    "flow '{}' has entry intent '{entry}' which is not defined",
                    flow.id
                ));
            }
        }
        for step in &flow.steps {
            if set.templates.for_step(&flow.id, &step.id).is_none() {
                warnings.push(format!(
                    "step '{}/{}' has no template and falls back to the intent's",
                    flow.id, step.id
                ));
            }
        }
    }

    warnings
}

pub async fn validate(
    data_dir: &Path,
    avatar: Option<AvatarSelector>,
    ping: bool,
    json: bool,
) -> Result<()> {
    let config = load_engine_config(data_dir).await;
    let selector = match avatar {
        Some(selector) => selector,
        None => config
            .default_avatar
            .parse::<AvatarSelector>()
            .map_err(anyhow::Error::msg)
            .context("Invalid default_avatar in config.toml")?,
    };

    let source = FileDefinitionSource::new(DataLayout::new(data_dir));
    let registry = AdvancementRegistry::with_defaults();
    let set = DefinitionSet::load(&source, &selector, &registry)
        .await
        .with_context(|| format!("Definitions for '{selector}' are invalid"))?;
    let warnings = lint(&set, &config);

    let ping_result = if ping {
        Some(ping_provider(&config).await)
    } else {
        None
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "avatar": selector.to_string(),
                "intents": set.intents.len(),
                "flows": set.flows.len(),
                "templates": set.templates.len(),
                "warnings": warnings,
                "provider_ok": ping_result.as_ref().map(|r| r.is_ok()),
            }))?
        );
    } else {
        println!();
        println!(
            "  {} Definitions for '{}' loaded",
            style("✓").green().bold(),
            style(&selector).cyan()
        );
        println!(
            "    {} intents, {} flows, {} templates",
            set.intents.len(),
            set.flows.len(),
            set.templates.len()
        );
        println!("    rules: {}", registry.names().join(", "));
        for warning in &warnings {
            println!("  {} {warning}", style("!").yellow().bold());
        }
        match &ping_result {
            Some(Ok(model)) => println!("  {} Provider answered ({model})", style("✓").green().bold()),
            Some(Err(e)) => println!("  {} Provider check failed: {e}", style("✗").red().bold()),
            None => {}
        }
        println!();
    }

    if let Some(Err(e)) = ping_result {
        return Err(e);
    }
    Ok(())
}

async fn ping_provider(config: &EngineConfig) -> Result<String> {
    let settings = config
        .provider
        .as_ref()
        .context("No [provider] section in config.toml")?;
    let provider = create_provider(settings, resolve_api_key(settings))
        .with_context(|| format!("Set {} to use the provider", settings.api_key_env))?;
    test_provider_connection(&provider)
        .await
        .context("Test request failed")?;
    Ok(provider.model().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::init::write_starter_definitions;
    use tempfile::TempDir;

    async fn load(dir: &Path, selector: &AvatarSelector) -> DefinitionSet {
        let source = FileDefinitionSource::new(DataLayout::new(dir));
        DefinitionSet::load(&source, selector, &AdvancementRegistry::with_defaults())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_starter_definitions_have_no_warnings() {
        let tmp = TempDir::new().unwrap();
        write_starter_definitions(tmp.path(), false).await.unwrap();
        let set = load(tmp.path(), &AvatarSelector::standard("sales")).await;
        assert_eq!(lint(&set, &EngineConfig::default()), Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_lint_reports_gaps() {
        let tmp = TempDir::new().unwrap();
        let layout = DataLayout::new(tmp.path());
        tokio::fs::create_dir_all(layout.avatar_dir("bare")).await.unwrap();
        tokio::fs::write(
            layout.avatar_dir("bare").join("intents.yaml"),
            "intents:\n  - name: demo_request\n    requires_flow: true\n",
        )
        .await
        .unwrap();

        let set = load(tmp.path(), &AvatarSelector::standard("bare")).await;
        let warnings = lint(&set, &EngineConfig::default());
        assert!(warnings.iter().any(|w| w.contains("'general_question' is not defined")));
        assert!(warnings.iter().any(|w| w.contains("'demo_request' has no prompt template")));
        assert!(warnings.iter().any(|w| w.contains("requires a flow")));
    }

    #[tokio::test]
    async fn test_validate_fails_on_invalid_definitions() {
        let tmp = TempDir::new().unwrap();
        let layout = DataLayout::new(tmp.path());
        tokio::fs::create_dir_all(layout.avatar_dir("sales")).await.unwrap();
        tokio::fs::write(
            layout.avatar_dir("sales").join("flows.yaml"),
            "flows:\n  - id: f\n    steps:\n      - id: s1\n        advancement: telepathy\n        next_steps: [completed]\n",
        )
        .await
        .unwrap();

        assert!(validate(tmp.path(), None, false, true).await.is_err());
    }

    #[tokio::test]
    async fn test_ping_without_provider_section_fails() {
        let err = ping_provider(&EngineConfig::default()).await.unwrap_err();
        assert!(err.to_string().contains("[provider]"));
    }
}
