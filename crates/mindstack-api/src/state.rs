//! Application state wiring all services together.
//!
//! AppState holds the concrete engine used by every CLI command. The core
//! services are generic over their repository traits; AppState pins them to
//! the SQLite implementations and loads definitions from the data directory.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use mindstack_core::definitions::DefinitionSet;
use mindstack_core::flow::FlowEngine;
use mindstack_core::intent::{ClassifierSettings, IntentClassifier};
use mindstack_core::llm::BoxLlmProvider;
use mindstack_core::memory::SessionMemoryStore;
use mindstack_core::orchestrator::MindOrchestrator;
use mindstack_core::prompt::PromptAssembler;
use mindstack_infra::config::load_engine_config;
use mindstack_infra::definitions::FileDefinitionSource;
use mindstack_infra::filesystem::{DataLayout, resolve_data_dir};
use mindstack_infra::llm::{create_provider, resolve_api_key};
use mindstack_infra::sqlite::flow::SqliteFlowRepository;
use mindstack_infra::sqlite::mind_state::SqliteMindStateRepository;
use mindstack_infra::sqlite::pool::{DatabasePool, database_url};
use mindstack_types::avatar::AvatarSelector;
use mindstack_types::config::EngineConfig;

/// The orchestrator pinned to the SQLite repositories.
pub type ConcreteOrchestrator = MindOrchestrator<SqliteMindStateRepository, SqliteFlowRepository>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ConcreteOrchestrator>,
    pub definitions: Arc<FileDefinitionSource>,
    /// Present when `[provider]` is configured and its API key resolves.
    pub provider: Option<Arc<BoxLlmProvider>>,
    pub config: EngineConfig,
}

impl AppState {
    /// Initialize from the resolved data directory.
    ///
    /// `avatar` overrides `default_avatar` from `config.toml`.
    pub async fn init(avatar: Option<AvatarSelector>) -> anyhow::Result<Self> {
        Self::init_at(&resolve_data_dir(), avatar).await
    }

    /// Connect to the database, load definitions and wire the engine.
    pub async fn init_at(data_dir: &Path, avatar: Option<AvatarSelector>) -> anyhow::Result<Self> {
        let layout = DataLayout::new(data_dir);
        layout
            .ensure()
            .await
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let config = load_engine_config(data_dir).await;
        let selector = match avatar {
            Some(selector) => selector,
            None => config
                .default_avatar
                .parse::<AvatarSelector>()
                .map_err(anyhow::Error::msg)
                .context("Invalid default_avatar in config.toml")?,
        };

        let db_pool = DatabasePool::new(&database_url(data_dir))
            .await
            .context("Failed to open database")?;

        let provider = build_provider(&config);

        let memory = Arc::new(SessionMemoryStore::new(
            SqliteMindStateRepository::new(db_pool.clone()),
            config.memory_retention(),
        ));
        let flows = FlowEngine::new(
            SqliteFlowRepository::new(db_pool.clone()),
            Arc::clone(&memory),
            config.flow_idle_timeout(),
        );
        flows
            .restore_active()
            .await
            .context("Failed to restore active flows")?;

        let definitions = Arc::new(FileDefinitionSource::new(layout));
        let set = DefinitionSet::load(definitions.as_ref(), &selector, flows.advancement())
            .await
            .with_context(|| format!("Failed to load definitions for avatar '{selector}'"))?;

        let classifier = IntentClassifier::new(provider.clone(), ClassifierSettings::from_config(&config));
        let assembler = PromptAssembler::from_config(&config);
        let orchestrator = MindOrchestrator::new(memory, flows, classifier, assembler, set, &config);

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            definitions,
            provider,
            config,
        })
    }

    /// Start the periodic sweeper; it stops when `cancel` fires.
    pub fn spawn_sweeper(&self, cancel: CancellationToken) -> JoinHandle<()> {
        self.orchestrator
            .spawn_sweeper(self.config.sweep_interval(), cancel)
    }
}

/// Provider from `[provider]`, or `None` (keyword matching, no generation).
fn build_provider(config: &EngineConfig) -> Option<Arc<BoxLlmProvider>> {
    let settings = config.provider.as_ref()?;
    match create_provider(settings, resolve_api_key(settings)) {
        Ok(provider) => Some(Arc::new(provider)),
        Err(e) => {
            warn!(
                provider = %settings.name,
                api_key_env = %settings.api_key_env,
                error = %e,
                "Provider unavailable, falling back to keyword classification"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::init::write_starter_definitions;
    use mindstack_core::orchestrator::FlowEvent;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_with_starter_definitions_runs_a_turn() {
        let tmp = TempDir::new().unwrap();
        write_starter_definitions(tmp.path(), false).await.unwrap();

        let state = AppState::init_at(tmp.path(), None).await.unwrap();
        assert!(state.provider.is_none());

        let plan = state
            .orchestrator
            .handle_message("s1", "Could I get a demo?", None)
            .await
            .unwrap();
        assert_eq!(plan.intent, "demo_request");
        assert_eq!(plan.flow_event, FlowEvent::Started);
        assert_eq!(plan.prompt.template_id, "demo_qualify");
        assert!(plan.prompt.system_prompt.contains("Ava"));
    }

    #[tokio::test]
    async fn test_active_flow_survives_restart() {
        let tmp = TempDir::new().unwrap();
        write_starter_definitions(tmp.path(), false).await.unwrap();

        {
            let state = AppState::init_at(tmp.path(), None).await.unwrap();
            state
                .orchestrator
                .handle_message("s1", "show me a demo", None)
                .await
                .unwrap();
        }

        let state = AppState::init_at(tmp.path(), None).await.unwrap();
        let execution = state.orchestrator.flows().active_flow("s1").unwrap();
        assert_eq!(execution.flow_id, "demo_booking");
        assert_eq!(execution.current_step, "qualify");
    }

    #[tokio::test]
    async fn test_unknown_avatar_loads_empty_set() {
        let tmp = TempDir::new().unwrap();
        let state = AppState::init_at(tmp.path(), Some(AvatarSelector::standard("support")))
            .await
            .unwrap();
        let defs = state.orchestrator.definitions().await;
        assert!(defs.intents.is_empty());
        assert!(defs.flows.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_definitions_fail_init() {
        let tmp = TempDir::new().unwrap();
        let layout = DataLayout::new(tmp.path());
        tokio::fs::create_dir_all(layout.avatar_dir("sales")).await.unwrap();
        tokio::fs::write(
            layout.avatar_dir("sales").join("flows.yaml"),
            "flows:\n  - id: f\n    steps:\n      - id: s1\n        next_steps: [nowhere]\n",
        )
        .await
        .unwrap();

        let err = AppState::init_at(tmp.path(), None).await.err().unwrap();
        assert!(err.to_string().contains("sales"));
    }
}
