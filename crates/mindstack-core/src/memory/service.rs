//! Session memory store.
//!
//! `SessionMemoryStore` owns every `MindStateStack` lifetime. Reads are
//! served from a process-wide cache and fall through to the repository;
//! every mutation is persisted before the cache is updated, so a failed save
//! leaves the cached state matching what is stored.
//!
//! Callers serialize mutations per session (see `MindOrchestrator`); the store
//! itself never holds a cache guard across an `.await`.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use mindstack_types::error::RepositoryError;
use mindstack_types::intent::IntentPolicy;
use mindstack_types::memory::{FlowHistoryEntry, FulfilledIntentRecord, MindStateStack, PruneReport};
use tracing::{debug, info};

use crate::memory::store::MindStateRepository;

struct CachedMemory {
    state: MindStateStack,
    last_access: DateTime<Utc>,
}

/// Cache-fronted owner of per-session memory.
pub struct SessionMemoryStore<R: MindStateRepository> {
    repo: R,
    cache: DashMap<String, CachedMemory>,
    retention: TimeDelta,
}

impl<R: MindStateRepository> SessionMemoryStore<R> {
    /// `retention` bounds how long stack items survive `cleanup_expired`.
    pub fn new(repo: R, retention: TimeDelta) -> Self {
        Self {
            repo,
            cache: DashMap::new(),
            retention,
        }
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Number of sessions currently cached.
    pub fn cached_sessions(&self) -> usize {
        self.cache.len()
    }

    /// Memory for `session_id`: cached, else loaded, else created and persisted.
    pub async fn get(&self, session_id: &str) -> Result<MindStateStack, RepositoryError> {
        let now = Utc::now();
        if let Some(mut cached) = self.cache.get_mut(session_id) {
            cached.last_access = now;
            return Ok(cached.state.clone());
        }

        let state = match self.repo.load(session_id).await? {
            Some(state) => state,
            None => {
                let state = MindStateStack::new(session_id, now);
                self.repo.save(&state).await?;
                debug!(session_id, "Created session memory");
                state
            }
        };
        self.cache_state(state.clone(), now);
        Ok(state)
    }

    /// Memory for `session_id` without creating it.
    pub async fn peek(&self, session_id: &str) -> Result<Option<MindStateStack>, RepositoryError> {
        if let Some(cached) = self.cache.get(session_id) {
            return Ok(Some(cached.state.clone()));
        }
        self.repo.load(session_id).await
    }

    /// Append a classified turn with the default (repeatable) policy.
    pub async fn push_intent(
        &self,
        session_id: &str,
        intent: &str,
        confidence: f32,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Result<MindStateStack, RepositoryError> {
        self.push_intent_with_policy(session_id, intent, confidence, metadata, IntentPolicy::default())
            .await
    }

    /// Append a classified turn, carrying the intent definition's policy into
    /// its fulfillment record.
    pub async fn push_intent_with_policy(
        &self,
        session_id: &str,
        intent: &str,
        confidence: f32,
        metadata: BTreeMap<String, serde_json::Value>,
        policy: IntentPolicy,
    ) -> Result<MindStateStack, RepositoryError> {
        let (state, ()) = self
            .mutate(session_id, |state, now| {
                state.push(intent, confidence, metadata, &policy, now);
            })
            .await?;
        debug!(session_id, intent, confidence, depth = state.stack.len(), "Pushed intent");
        Ok(state)
    }

    pub async fn can_execute_intent(
        &self,
        session_id: &str,
        intent: &str,
    ) -> Result<bool, RepositoryError> {
        let state = self.get(session_id).await?;
        Ok(state.can_execute(intent, Utc::now()))
    }

    /// Record that a response for `intent` was delivered.
    pub async fn mark_intent_fulfilled(
        &self,
        session_id: &str,
        intent: &str,
    ) -> Result<FulfilledIntentRecord, RepositoryError> {
        let (_, record) = self
            .mutate(session_id, |state, now| state.mark_fulfilled(intent, now).clone())
            .await?;
        info!(
            session_id,
            intent,
            completion_count = record.completion_count,
            "Intent fulfilled"
        );
        Ok(record)
    }

    /// Clear the fulfilled flag of an intent. Returns false if it had no record.
    pub async fn reset_intent(&self, session_id: &str, intent: &str) -> Result<bool, RepositoryError> {
        let (_, reset) = self
            .mutate(session_id, |state, now| state.reset_intent(intent, now))
            .await?;
        if reset {
            info!(session_id, intent, "Intent reset");
        }
        Ok(reset)
    }

    /// Mirror the active flow position into memory.
    pub async fn update_current_flow(
        &self,
        session_id: &str,
        flow_id: &str,
        step_id: &str,
    ) -> Result<(), RepositoryError> {
        self.mutate(session_id, |state, now| {
            state.set_current_flow(flow_id, step_id, now)
        })
        .await?;
        debug!(session_id, flow_id, step_id, "Current flow updated");
        Ok(())
    }

    /// Clear the flow mirror if it still points at `flow_id`.
    pub async fn clear_current_flow(
        &self,
        session_id: &str,
        flow_id: &str,
    ) -> Result<bool, RepositoryError> {
        let (_, cleared) = self
            .mutate(session_id, |state, now| state.clear_current_flow_if(flow_id, now))
            .await?;
        Ok(cleared)
    }

    /// Append a finished flow to the session's history and clear the mirror
    /// if it still points at that flow.
    pub async fn record_flow_outcome(
        &self,
        session_id: &str,
        entry: FlowHistoryEntry,
    ) -> Result<(), RepositoryError> {
        self.mutate(session_id, |state, now| {
            state.clear_current_flow_if(&entry.flow_id, now);
            state.flow_history.push(entry);
            state.updated_at = now;
        })
        .await?;
        Ok(())
    }

    /// Drop stale stack items and expired fulfillment records for one session.
    ///
    /// Persists only when something was removed.
    pub async fn cleanup_expired(&self, session_id: &str) -> Result<PruneReport, RepositoryError> {
        let mut state = self.get(session_id).await?;
        let now = Utc::now();
        let report = state.prune(now, self.retention);
        if !report.is_empty() {
            self.repo.save(&state).await?;
            self.cache_state(state, now);
            debug!(
                session_id,
                stack_items = report.stack_items,
                fulfilled_records = report.fulfilled_records,
                "Pruned session memory"
            );
        }
        Ok(report)
    }

    /// Ids of the sessions currently cached.
    pub fn cached_session_ids(&self) -> Vec<String> {
        self.cache.iter().map(|e| e.key().clone()).collect()
    }

    /// Drop cache entries not accessed within `idle`. Stored documents are kept.
    pub fn evict_idle(&self, idle: TimeDelta) -> usize {
        let now = Utc::now();
        let before = self.cache.len();
        self.cache.retain(|_, cached| now - cached.last_access < idle);
        let evicted = before - self.cache.len();
        if evicted > 0 {
            debug!(evicted, "Evicted idle session memories");
        }
        evicted
    }

    /// Load, modify, persist, then cache.
    async fn mutate<T>(
        &self,
        session_id: &str,
        apply: impl FnOnce(&mut MindStateStack, DateTime<Utc>) -> T,
    ) -> Result<(MindStateStack, T), RepositoryError> {
        let mut state = self.get(session_id).await?;
        let now = Utc::now();
        let out = apply(&mut state, now);
        self.repo.save(&state).await?;
        self.cache_state(state.clone(), now);
        Ok((state, out))
    }

    fn cache_state(&self, state: MindStateStack, now: DateTime<Utc>) {
        self.cache.insert(
            state.session_id.clone(),
            CachedMemory {
                state,
                last_access: now,
            },
        );
    }
}
