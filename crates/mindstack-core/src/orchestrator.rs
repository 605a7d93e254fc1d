//! Per-message orchestration.
//!
//! `MindOrchestrator` wires the memory store, classifier, flow engine and
//! prompt assembler into one turn pipeline:
//!
//! 1. take the session lock and snapshot the current definitions
//! 2. classify the message against the session's memory
//! 3. gate intents that may not run again (downgrade to the general intent)
//! 4. continue, advance or start a flow
//! 5. push the turn onto memory
//! 6. gather knowledge snippets and assemble the prompt
//!
//! Generation is left to the caller, which reports back via `complete_turn`.
//! Every mutation of a session happens under its lock, so at most one turn
//! (or sweep step) touches a session at a time while different sessions run
//! in parallel.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use dashmap::DashMap;
use mindstack_types::avatar::{AvatarProfile, AvatarSelector};
use mindstack_types::config::EngineConfig;
use mindstack_types::error::MindError;
use mindstack_types::flow::FlowExecution;
use mindstack_types::intent::{IntentClassification, IntentPolicy};
use mindstack_types::llm::Message;
use mindstack_types::memory::{FulfilledIntentRecord, MindStateStack};
use mindstack_types::prompt::AssembledPrompt;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::definitions::{DefinitionSet, DefinitionSource};
use crate::flow::{FlowEngine, FlowRepository};
use crate::intent::IntentClassifier;
use crate::knowledge::BoxKnowledgeSource;
use crate::memory::{MindStateRepository, SessionMemoryStore};
use crate::prompt::{PromptAssembler, PromptInputs};

/// What happened to the session's flow during a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowEvent {
    None,
    Started,
    Continued,
    Advanced,
    Completed,
    TimedOut,
}

impl std::fmt::Display for FlowEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FlowEvent::None => "none",
            FlowEvent::Started => "started",
            FlowEvent::Continued => "continued",
            FlowEvent::Advanced => "advanced",
            FlowEvent::Completed => "completed",
            FlowEvent::TimedOut => "timed_out",
        };
        write!(f, "{s}")
    }
}

/// Outcome of one turn: everything needed to generate and record a reply.
#[derive(Debug, Clone, Serialize)]
pub struct TurnPlan {
    pub session_id: String,
    pub avatar: AvatarSelector,
    pub classification: IntentClassification,
    /// Intent used for the turn after gating.
    pub intent: String,
    /// The classified intent, when gating replaced it.
    pub gated_from: Option<String>,
    pub flow: Option<FlowExecution>,
    pub flow_event: FlowEvent,
    pub knowledge: Vec<String>,
    pub prompt: AssembledPrompt,
}

impl TurnPlan {
    pub fn gated(&self) -> bool {
        self.gated_from.is_some()
    }
}

/// Counts from one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub timed_out_flows: usize,
    pub pruned_items: usize,
    pub pruned_records: usize,
    pub evicted_sessions: usize,
    pub released_locks: usize,
    pub failures: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

pub struct MindOrchestrator<M: MindStateRepository, F: FlowRepository> {
    memory: Arc<SessionMemoryStore<M>>,
    flows: FlowEngine<F, M>,
    classifier: IntentClassifier,
    assembler: PromptAssembler,
    knowledge: Option<BoxKnowledgeSource>,
    definitions: RwLock<Arc<DefinitionSet>>,
    avatar: AvatarProfile,
    locks: DashMap<String, Arc<Mutex<()>>>,
    general_intent: String,
    fallback_confidence: f32,
    session_idle: TimeDelta,
}

impl<M: MindStateRepository, F: FlowRepository> MindOrchestrator<M, F> {
    /// `flows` must share `memory` with this orchestrator.
    pub fn new(
        memory: Arc<SessionMemoryStore<M>>,
        flows: FlowEngine<F, M>,
        classifier: IntentClassifier,
        assembler: PromptAssembler,
        definitions: DefinitionSet,
        config: &EngineConfig,
    ) -> Self {
        Self {
            memory,
            flows,
            classifier,
            assembler,
            knowledge: None,
            definitions: RwLock::new(Arc::new(definitions)),
            avatar: config.avatar.clone(),
            locks: DashMap::new(),
            general_intent: config.general_question_intent.clone(),
            fallback_confidence: config.fallback_confidence,
            session_idle: config.session_idle(),
        }
    }

    pub fn with_knowledge(mut self, source: BoxKnowledgeSource) -> Self {
        self.knowledge = Some(source);
        self
    }

    pub fn memory(&self) -> &SessionMemoryStore<M> {
        &self.memory
    }

    pub fn flows(&self) -> &FlowEngine<F, M> {
        &self.flows
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    pub fn avatar(&self) -> &AvatarProfile {
        &self.avatar
    }

    /// Snapshot of the current definitions.
    pub async fn definitions(&self) -> Arc<DefinitionSet> {
        self.definitions.read().await.clone()
    }

    /// Number of sessions with a lock entry.
    pub fn locked_sessions(&self) -> usize {
        self.locks.len()
    }

    fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run the turn pipeline for one user message.
    #[tracing::instrument(
        name = "mind.turn",
        skip(self, message, history),
        fields(session_id = %session_id, message_len = message.len())
    )]
    pub async fn handle_message(
        &self,
        session_id: &str,
        message: &str,
        history: Option<&[Message]>,
    ) -> Result<TurnPlan, MindError> {
        if session_id.trim().is_empty() {
            return Err(MindError::InvalidInput("session id must not be empty".to_string()));
        }
        let message = message.trim();
        if message.is_empty() {
            return Err(MindError::InvalidInput("message must not be empty".to_string()));
        }

        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;
        let defs = self.definitions().await;

        let memory = self.memory.get(session_id).await?;
        let classification = self
            .classifier
            .classify(message, Some(&memory), &defs.intents)
            .await;

        let mut intent = classification.intent.clone();
        let mut confidence = classification.confidence;
        let mut gated_from = None;
        if !self.memory.can_execute_intent(session_id, &intent).await? {
            info!(intent = %intent, fallback = %self.general_intent, "Intent already fulfilled");
            gated_from = Some(intent);
            intent = self.general_intent.clone();
            confidence = self.fallback_confidence;
        }

        let (flow, flow_event) = self.drive_flow(session_id, message, &intent, &defs).await?;

        let mut metadata = BTreeMap::new();
        metadata.insert(
            "source".to_string(),
            serde_json::Value::from(classification.source.to_string()),
        );
        if let Some(original) = &gated_from {
            metadata.insert(
                "gated_from".to_string(),
                serde_json::Value::from(original.as_str()),
            );
        }
        if let Some(execution) = &flow {
            metadata.insert(
                "flow".to_string(),
                serde_json::Value::from(execution.flow_id.as_str()),
            );
            metadata.insert(
                "flow_step".to_string(),
                serde_json::Value::from(execution.current_step.as_str()),
            );
        }
        let policy = defs
            .intents
            .get(&intent)
            .map(|d| d.policy())
            .unwrap_or_else(IntentPolicy::default);
        let memory = self
            .memory
            .push_intent_with_policy(session_id, &intent, confidence, metadata, policy)
            .await?;

        let knowledge = self.lookup_knowledge(message).await;

        let prompt = self.assembler.build(
            &defs.templates,
            &PromptInputs {
                intent: &intent,
                message,
                avatar: &self.avatar,
                memory: &memory,
                rag: Some(&knowledge),
                history,
                flow: flow.as_ref(),
            },
        )?;

        info!(
            intent = %intent,
            confidence,
            flow_event = %flow_event,
            template_id = %prompt.template_id,
            "Turn planned"
        );

        Ok(TurnPlan {
            session_id: session_id.to_string(),
            avatar: defs.selector().clone(),
            classification,
            intent,
            gated_from,
            flow,
            flow_event,
            knowledge,
            prompt,
        })
    }

    async fn drive_flow(
        &self,
        session_id: &str,
        message: &str,
        intent: &str,
        defs: &DefinitionSet,
    ) -> Result<(Option<FlowExecution>, FlowEvent), MindError> {
        let catalog = &defs.flows;
        let active = self.flows.active_flow(session_id);
        if let Some(execution) = &active {
            if catalog.get(&execution.flow_id).is_none() {
                warn!(flow_id = %execution.flow_id, "Cancelling flow missing from definitions");
                self.flows.cancel_flow(session_id).await?;
            }
        }
        let had_active = self.flows.active_flow(session_id).is_some();

        if self.flows.should_continue_flow(session_id, intent, catalog).await? {
            let decision = self
                .flows
                .evaluate_advancement(session_id, message, intent, catalog)
                .await?;
            if !decision.is_some_and(|d| d.advance) {
                return Ok((self.flows.active_flow(session_id), FlowEvent::Continued));
            }
            return match self.flows.progress_flow(session_id, message, None, catalog).await? {
                Some(execution) if execution.is_active() => Ok((Some(execution), FlowEvent::Advanced)),
                Some(execution) => Ok((Some(execution), FlowEvent::Completed)),
                None => Ok((None, FlowEvent::None)),
            };
        }

        if let Some(execution) = self.flows.start_flow(session_id, intent, catalog, message).await? {
            return Ok((Some(execution), FlowEvent::Started));
        }
        if had_active {
            return Ok((None, FlowEvent::TimedOut));
        }
        Ok((None, FlowEvent::None))
    }

    async fn lookup_knowledge(&self, message: &str) -> Vec<String> {
        let Some(source) = &self.knowledge else {
            return Vec::new();
        };
        match source.query(message).await {
            Ok(snippets) => {
                debug!(snippets = snippets.len(), "Knowledge lookup");
                snippets
            }
            Err(e) => {
                warn!(error = %e, "Knowledge lookup failed, continuing without it");
                Vec::new()
            }
        }
    }

    /// Classify without touching memory or flows.
    pub async fn classify(
        &self,
        message: &str,
        session_id: Option<&str>,
    ) -> Result<IntentClassification, MindError> {
        let defs = self.definitions().await;
        let memory = match session_id {
            Some(id) => self.memory.peek(id).await?,
            None => None,
        };
        Ok(self
            .classifier
            .classify(message, memory.as_ref(), &defs.intents)
            .await)
    }

    /// Record that the reply for `intent` was delivered.
    pub async fn complete_turn(
        &self,
        session_id: &str,
        intent: &str,
    ) -> Result<FulfilledIntentRecord, MindError> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;
        Ok(self.memory.mark_intent_fulfilled(session_id, intent).await?)
    }

    pub async fn reset_intent(&self, session_id: &str, intent: &str) -> Result<bool, MindError> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;
        Ok(self.memory.reset_intent(session_id, intent).await?)
    }

    pub async fn cancel_flow(&self, session_id: &str) -> Result<Option<FlowExecution>, MindError> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;
        self.flows.cancel_flow(session_id).await
    }

    pub async fn session_memory(&self, session_id: &str) -> Result<Option<MindStateStack>, MindError> {
        Ok(self.memory.peek(session_id).await?)
    }

    /// Load definitions for `selector` and make them current.
    ///
    /// On error the previous definitions stay in place. Active flows the new
    /// set does not define are cancelled.
    #[tracing::instrument(name = "mind.switch_avatar", skip(self, source), fields(avatar = %selector))]
    pub async fn switch_avatar<S: DefinitionSource>(
        &self,
        source: &S,
        selector: &AvatarSelector,
    ) -> Result<(), MindError> {
        let set = DefinitionSet::load(source, selector, self.flows.advancement()).await?;
        let orphans = self.flows.orphaned_sessions(&set.flows);
        let set = Arc::new(set);
        *self.definitions.write().await = set.clone();

        for session_id in orphans {
            let lock = self.session_lock(&session_id);
            let _guard = lock.lock().await;
            let still_orphaned = self
                .flows
                .active_flow(&session_id)
                .is_some_and(|e| set.flows.get(&e.flow_id).is_none());
            if still_orphaned {
                self.flows.cancel_flow(&session_id).await?;
            }
        }
        info!("Avatar switched");
        Ok(())
    }

    /// One cleanup pass: idle flows, expired memory, idle cache entries and
    /// unused session locks. Per-session failures are logged and counted.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        for session_id in self.flows.idle_sessions() {
            let lock = self.session_lock(&session_id);
            let _guard = lock.lock().await;
            match self.flows.timeout_if_idle(&session_id).await {
                Ok(true) => report.timed_out_flows += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Failed to time out idle flow");
                    report.failures += 1;
                }
            }
        }

        for session_id in self.memory.cached_session_ids() {
            let lock = self.session_lock(&session_id);
            let _guard = lock.lock().await;
            match self.memory.cleanup_expired(&session_id).await {
                Ok(pruned) => {
                    report.pruned_items += pruned.stack_items;
                    report.pruned_records += pruned.fulfilled_records;
                }
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Failed to prune session memory");
                    report.failures += 1;
                }
            }
        }

        report.evicted_sessions = self.memory.evict_idle(self.session_idle);

        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        report.released_locks = before.saturating_sub(self.locks.len());

        report
    }
}

impl<M, F> MindOrchestrator<M, F>
where
    M: MindStateRepository + 'static,
    F: FlowRepository + 'static,
{
    /// Run `sweep` every `interval` until `cancel` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let report = orchestrator.sweep().await;
                        if !report.is_empty() {
                            info!(
                                timed_out_flows = report.timed_out_flows,
                                pruned_items = report.pruned_items,
                                pruned_records = report.pruned_records,
                                evicted_sessions = report.evicted_sessions,
                                released_locks = report.released_locks,
                                failures = report.failures,
                                "Sweep finished"
                            );
                        }
                    }
                }
            }
        })
    }
}
