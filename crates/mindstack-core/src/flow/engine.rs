//! Flow engine: one active flow per session.
//!
//! The engine owns every `FlowExecution` lifetime. Active executions live in
//! a process-wide map keyed by session id and are written through to the
//! `FlowRepository` on every transition. The current position is mirrored
//! into session memory so the prompt assembler can read it.
//!
//! `max_duration` is applied lazily when a session is next touched; idle
//! flows are timed out by the periodic sweep.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use dashmap::DashMap;
use mindstack_types::error::{ConfigurationError, MindError, RepositoryError};
use mindstack_types::flow::{FLOW_COMPLETED, FlowExecution, FlowStatus};
use mindstack_types::memory::FlowHistoryEntry;
use tracing::{debug, info, warn};

use crate::flow::advancement::{AdvanceContext, AdvanceDecision, AdvancementRegistry, DEFAULT_RULE};
use crate::flow::definition::FlowCatalog;
use crate::flow::repository::FlowRepository;
use crate::flow::selector::{FirstSuccessor, NextStepSelector};
use crate::memory::{MindStateRepository, SessionMemoryStore};

/// Flow state machine over a catalog supplied per call.
pub struct FlowEngine<F: FlowRepository, M: MindStateRepository> {
    repo: F,
    memory: Arc<SessionMemoryStore<M>>,
    active: DashMap<String, FlowExecution>,
    advancement: AdvancementRegistry,
    selector: Box<dyn NextStepSelector>,
    idle_timeout: TimeDelta,
}

impl<F: FlowRepository, M: MindStateRepository> FlowEngine<F, M> {
    /// Engine with the default advancement rules and `FirstSuccessor`.
    pub fn new(repo: F, memory: Arc<SessionMemoryStore<M>>, idle_timeout: TimeDelta) -> Self {
        Self {
            repo,
            memory,
            active: DashMap::new(),
            advancement: AdvancementRegistry::with_defaults(),
            selector: Box::new(FirstSuccessor),
            idle_timeout,
        }
    }

    pub fn with_advancement(mut self, registry: AdvancementRegistry) -> Self {
        self.advancement = registry;
        self
    }

    pub fn with_selector(mut self, selector: Box<dyn NextStepSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn repo(&self) -> &F {
        &self.repo
    }

    pub fn advancement(&self) -> &AdvancementRegistry {
        &self.advancement
    }

    /// Reload active executions persisted by a previous process.
    pub async fn restore_active(&self) -> Result<usize, RepositoryError> {
        let executions = self.repo.load_active().await?;
        let mut restored = 0;
        for execution in executions {
            if self.active.contains_key(&execution.session_id) {
                warn!(
                    session_id = %execution.session_id,
                    execution_id = %execution.id,
                    "Skipping second active flow for session"
                );
                continue;
            }
            self.active.insert(execution.session_id.clone(), execution);
            restored += 1;
        }
        if restored > 0 {
            info!(restored, "Restored active flows");
        }
        Ok(restored)
    }

    /// Snapshot of the session's active execution.
    pub fn active_flow(&self, session_id: &str) -> Option<FlowExecution> {
        self.active.get(session_id).map(|e| e.value().clone())
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Start the best flow for `intent`, or return the one already running.
    ///
    /// Returns `None` when no flow lists `intent` as an entry intent, or when
    /// the flow is non-repeatable and this session already completed it.
    #[tracing::instrument(
        name = "flow.start",
        skip(self, catalog, message),
        fields(session_id = %session_id, intent = %intent)
    )]
    pub async fn start_flow(
        &self,
        session_id: &str,
        intent: &str,
        catalog: &FlowCatalog,
        message: &str,
    ) -> Result<Option<FlowExecution>, MindError> {
        let Some(def) = catalog.find_by_entry_intent(intent) else {
            return Ok(None);
        };

        if let Some(existing) = self.active_flow(session_id) {
            if existing.flow_id == def.id {
                return Ok(Some(existing));
            }
            warn!(
                previous_flow = %existing.flow_id,
                flow_id = %def.id,
                "Superseding active flow"
            );
            self.cancel_flow(session_id).await?;
        }

        if !def.repeatable {
            let memory = self.memory.get(session_id).await?;
            let already_done = memory
                .flow_history
                .iter()
                .any(|h| h.flow_id == def.id && h.status == FlowStatus::Completed);
            if already_done {
                debug!(flow_id = %def.id, "Non-repeatable flow already completed");
                return Ok(None);
            }
        }

        let first = def
            .first_step()
            .ok_or_else(|| ConfigurationError::EmptyFlow(def.id.clone()))?;
        let mut execution = FlowExecution::start(session_id, &def.id, &first.id, Utc::now());
        execution
            .context
            .insert("entry_intent".to_string(), intent.to_string());
        execution
            .context
            .insert("entry_message".to_string(), message.to_string());

        self.repo.save_execution(&execution).await?;
        self.active
            .insert(session_id.to_string(), execution.clone());
        self.memory
            .update_current_flow(session_id, &def.id, &first.id)
            .await?;

        info!(
            flow_id = %def.id,
            step_id = %first.id,
            execution_id = %execution.id,
            "Flow started"
        );
        Ok(Some(execution))
    }

    /// Whether the session's active flow should keep handling this turn.
    ///
    /// Entry intents of the active flow always continue it. Any other intent
    /// continues it until `max_duration` has elapsed, at which point the flow
    /// is timed out.
    pub async fn should_continue_flow(
        &self,
        session_id: &str,
        intent: &str,
        catalog: &FlowCatalog,
    ) -> Result<bool, MindError> {
        let Some(execution) = self.active_flow(session_id) else {
            return Ok(false);
        };
        let def = catalog
            .get(&execution.flow_id)
            .ok_or_else(|| ConfigurationError::UnknownFlow(execution.flow_id.clone()))?;

        if def.is_entry_intent(intent) {
            return Ok(true);
        }

        if execution.elapsed(Utc::now()) > def.max_duration() {
            info!(
                session_id,
                flow_id = %def.id,
                max_duration_secs = def.max_duration_secs,
                "Flow exceeded max duration"
            );
            self.timeout_flow(session_id).await?;
            return Ok(false);
        }

        Ok(true)
    }

    /// Run the current step's advancement rule against `message`.
    ///
    /// Captured values are merged into the execution context and persisted.
    /// Returns `None` without an active flow.
    pub async fn evaluate_advancement(
        &self,
        session_id: &str,
        message: &str,
        intent: &str,
        catalog: &FlowCatalog,
    ) -> Result<Option<AdvanceDecision>, MindError> {
        let Some(mut execution) = self.active_flow(session_id) else {
            return Ok(None);
        };
        let def = catalog
            .get(&execution.flow_id)
            .ok_or_else(|| ConfigurationError::UnknownFlow(execution.flow_id.clone()))?;
        let step = def
            .step(&execution.current_step)
            .ok_or_else(|| ConfigurationError::UnknownStep {
                flow_id: def.id.clone(),
                step_id: execution.current_step.clone(),
            })?;

        let rule_name = def.advancement_for(step).unwrap_or(DEFAULT_RULE);
        let rule = self.advancement.get(rule_name)?;
        let decision = rule.evaluate(&AdvanceContext {
            message,
            intent,
            step,
            execution: &execution,
        });
        debug!(
            session_id,
            flow_id = %def.id,
            step_id = %step.id,
            rule = rule_name,
            advance = decision.advance,
            "Evaluated step advancement"
        );

        if !decision.captured.is_empty() {
            execution.context.extend(decision.captured.clone());
            execution.last_activity = Utc::now();
            self.repo.save_execution(&execution).await?;
            self.active.insert(session_id.to_string(), execution);
        }

        Ok(Some(decision))
    }

    /// Complete a step and move to the selected successor.
    ///
    /// `completed_step` defaults to the current step. Completing an already
    /// completed step is a no-op for the bookkeeping. The completion sentinel,
    /// or a step without successors, completes the flow. Returns `None`
    /// without an active flow.
    #[tracing::instrument(
        name = "flow.progress",
        skip(self, catalog, message),
        fields(session_id = %session_id)
    )]
    pub async fn progress_flow(
        &self,
        session_id: &str,
        message: &str,
        completed_step: Option<&str>,
        catalog: &FlowCatalog,
    ) -> Result<Option<FlowExecution>, MindError> {
        let Some(mut execution) = self.active_flow(session_id) else {
            return Ok(None);
        };
        let def = catalog
            .get(&execution.flow_id)
            .ok_or_else(|| ConfigurationError::UnknownFlow(execution.flow_id.clone()))?;

        let step_id = completed_step
            .unwrap_or(execution.current_step.as_str())
            .to_string();
        if def.step(&step_id).is_none() {
            return Err(ConfigurationError::UnknownStep {
                flow_id: def.id.clone(),
                step_id,
            }
            .into());
        }

        let now = Utc::now();
        if execution.complete_step(&step_id, now) && !message.trim().is_empty() {
            execution
                .context
                .insert(format!("answer_{step_id}"), message.trim().to_string());
        }

        let current = def
            .step(&execution.current_step)
            .ok_or_else(|| ConfigurationError::UnknownStep {
                flow_id: def.id.clone(),
                step_id: execution.current_step.clone(),
            })?;

        match self.selector.select(def, current, &execution) {
            None | Some(FLOW_COMPLETED) => {
                let finished = self.finish(execution, FlowStatus::Completed).await?;
                Ok(Some(finished))
            }
            Some(next) => {
                if def.step(next).is_none() {
                    return Err(ConfigurationError::UnknownStep {
                        flow_id: def.id.clone(),
                        step_id: next.to_string(),
                    }
                    .into());
                }
                execution.enter_step(next, now);
                self.repo.save_execution(&execution).await?;
                self.active
                    .insert(session_id.to_string(), execution.clone());
                self.memory
                    .update_current_flow(session_id, &def.id, next)
                    .await?;
                info!(flow_id = %def.id, step_id = next, "Flow advanced");
                Ok(Some(execution))
            }
        }
    }

    pub async fn complete_flow(&self, session_id: &str) -> Result<Option<FlowExecution>, MindError> {
        self.finish_active(session_id, FlowStatus::Completed).await
    }

    pub async fn timeout_flow(&self, session_id: &str) -> Result<Option<FlowExecution>, MindError> {
        self.finish_active(session_id, FlowStatus::Timeout).await
    }

    pub async fn cancel_flow(&self, session_id: &str) -> Result<Option<FlowExecution>, MindError> {
        self.finish_active(session_id, FlowStatus::Cancelled).await
    }

    /// Sessions whose active flow has been idle longer than the idle timeout.
    pub fn idle_sessions(&self) -> Vec<String> {
        let now = Utc::now();
        self.active
            .iter()
            .filter(|e| e.value().idle_for(now) > self.idle_timeout)
            .map(|e| e.key().clone())
            .collect()
    }

    /// Time out the session's flow if it is still idle.
    pub async fn timeout_if_idle(&self, session_id: &str) -> Result<bool, MindError> {
        let idle = self
            .active
            .get(session_id)
            .is_some_and(|e| e.value().idle_for(Utc::now()) > self.idle_timeout);
        if idle {
            self.timeout_flow(session_id).await?;
        }
        Ok(idle)
    }

    /// Time out every flow idle beyond the idle timeout.
    pub async fn cleanup_inactive_flows(&self) -> Result<usize, MindError> {
        let mut timed_out = 0;
        for session_id in self.idle_sessions() {
            if self.timeout_if_idle(&session_id).await? {
                timed_out += 1;
            }
        }
        if timed_out > 0 {
            info!(timed_out, "Timed out inactive flows");
        }
        Ok(timed_out)
    }

    /// Sessions whose active flow has no definition in `catalog`.
    pub fn orphaned_sessions(&self, catalog: &FlowCatalog) -> Vec<String> {
        self.active
            .iter()
            .filter(|e| catalog.get(&e.value().flow_id).is_none())
            .map(|e| e.key().clone())
            .collect()
    }

    async fn finish_active(
        &self,
        session_id: &str,
        status: FlowStatus,
    ) -> Result<Option<FlowExecution>, MindError> {
        match self.active_flow(session_id) {
            Some(execution) => Ok(Some(self.finish(execution, status).await?)),
            None => Ok(None),
        }
    }

    /// Terminal transition: persist, drop from the active map, record history.
    async fn finish(
        &self,
        mut execution: FlowExecution,
        status: FlowStatus,
    ) -> Result<FlowExecution, MindError> {
        let now = Utc::now();
        execution.finish(status, now);
        self.repo.save_execution(&execution).await?;
        self.active
            .remove_if(&execution.session_id, |_, active| active.id == execution.id);

        self.memory
            .record_flow_outcome(
                &execution.session_id,
                FlowHistoryEntry {
                    execution_id: execution.id,
                    flow_id: execution.flow_id.clone(),
                    status,
                    started_at: execution.start_time,
                    ended_at: now,
                    completed_steps: execution.completed_steps.clone(),
                },
            )
            .await?;

        info!(
            session_id = %execution.session_id,
            flow_id = %execution.flow_id,
            execution_id = %execution.id,
            status = %status,
            completed_steps = execution.completed_steps.len(),
            "Flow finished"
        );
        Ok(execution)
    }
}
