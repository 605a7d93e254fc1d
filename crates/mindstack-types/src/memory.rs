//! Session memory types for Mindstack.
//!
//! A `MindStateStack` is the per-session record of what the user asked for
//! (the append-only intent stack), which intents have already been served
//! (fulfillment bookkeeping) and which flow step the session is currently in.
//! All rule evaluation here is pure and takes `now` explicitly so callers and
//! tests control the clock.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::secs_to_delta;
use crate::flow::FlowStatus;
use crate::intent::IntentPolicy;

/// One classified turn on the stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MindStateStackItem {
    /// Unique tag for this entry (UUIDv7, so it sorts chronologically).
    pub tag: String,
    pub timestamp: DateTime<Utc>,
    pub intent: String,
    pub confidence: f32,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl MindStateStackItem {
    pub fn new(
        intent: impl Into<String>,
        confidence: f32,
        metadata: BTreeMap<String, serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            tag: Uuid::now_v7().to_string(),
            timestamp: now,
            intent: intent.into(),
            confidence,
            metadata,
        }
    }

    /// Age of this entry relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> TimeDelta {
        now - self.timestamp
    }
}

/// Fulfillment bookkeeping for one intent within one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulfilledIntentRecord {
    pub fulfilled: bool,
    pub repeatable: bool,
    /// Number of completed responses for this intent. Never decreases.
    pub completion_count: u32,
    pub last_used: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age_secs: Option<u64>,
}

impl FulfilledIntentRecord {
    /// Record created the first time an intent is pushed.
    pub fn new(policy: &IntentPolicy, now: DateTime<Utc>) -> Self {
        Self {
            fulfilled: false,
            repeatable: policy.repeatable,
            completion_count: 0,
            last_used: now,
            max_age_secs: policy.max_age_secs,
        }
    }

    /// Whether the intent may fire again at `now`.
    ///
    /// Non-repeatable intents are blocked once fulfilled. Intents with a
    /// `max_age` are blocked until that many seconds have passed since
    /// `last_used`.
    pub fn can_execute(&self, now: DateTime<Utc>) -> bool {
        if !self.repeatable && self.fulfilled {
            return false;
        }
        if let Some(max_age) = self.max_age_secs {
            if now - self.last_used < secs_to_delta(max_age) {
                return false;
            }
        }
        true
    }

    /// Whether the record has outlived its `max_age` and can be dropped.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.max_age_secs {
            Some(max_age) => now - self.last_used >= secs_to_delta(max_age),
            None => false,
        }
    }

    pub fn mark_fulfilled(&mut self, now: DateTime<Utc>) {
        self.fulfilled = true;
        self.completion_count += 1;
        self.last_used = now;
    }
}

/// Outcome of a finished flow, kept in the session memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowHistoryEntry {
    pub execution_id: Uuid,
    pub flow_id: String,
    pub status: FlowStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_steps: Vec<String>,
}

/// Per-session memory document. Persisted as a whole (full replace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MindStateStack {
    pub session_id: String,
    #[serde(default)]
    pub stack: Vec<MindStateStackItem>,
    #[serde(default)]
    pub fulfilled_intents: BTreeMap<String, FulfilledIntentRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_flow: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_flow_step: Option<String>,
    #[serde(default)]
    pub flow_history: Vec<FlowHistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Counts of what a retention pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub stack_items: usize,
    pub fulfilled_records: usize,
}

impl PruneReport {
    pub fn is_empty(&self) -> bool {
        self.stack_items == 0 && self.fulfilled_records == 0
    }
}

impl MindStateStack {
    /// Empty memory for a new session.
    pub fn new(session_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            stack: Vec::new(),
            fulfilled_intents: BTreeMap::new(),
            current_flow: None,
            current_flow_step: None,
            flow_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Most recent stack entry.
    pub fn top(&self) -> Option<&MindStateStackItem> {
        self.stack.last()
    }

    /// The last `n` entries in chronological order.
    pub fn recent(&self, n: usize) -> &[MindStateStackItem] {
        let start = self.stack.len().saturating_sub(n);
        &self.stack[start..]
    }

    /// Append a classified turn and initialise or refresh its fulfillment record.
    pub fn push(
        &mut self,
        intent: &str,
        confidence: f32,
        metadata: BTreeMap<String, serde_json::Value>,
        policy: &IntentPolicy,
        now: DateTime<Utc>,
    ) {
        self.stack
            .push(MindStateStackItem::new(intent, confidence, metadata, now));
        let record = self
            .fulfilled_intents
            .entry(intent.to_string())
            .or_insert_with(|| FulfilledIntentRecord::new(policy, now));
        record.repeatable = policy.repeatable;
        record.max_age_secs = policy.max_age_secs;
        record.last_used = now;
        self.updated_at = now;
    }

    /// See [`FulfilledIntentRecord::can_execute`]. Unknown intents may always fire.
    pub fn can_execute(&self, intent: &str, now: DateTime<Utc>) -> bool {
        self.fulfilled_intents
            .get(intent)
            .map_or(true, |record| record.can_execute(now))
    }

    /// Mark an intent as served. Creates the record if the intent was never pushed.
    pub fn mark_fulfilled(&mut self, intent: &str, now: DateTime<Utc>) -> &FulfilledIntentRecord {
        let record = self
            .fulfilled_intents
            .entry(intent.to_string())
            .or_insert_with(|| FulfilledIntentRecord::new(&IntentPolicy::default(), now));
        record.mark_fulfilled(now);
        self.updated_at = now;
        record
    }

    /// Clear the fulfilled flag. The completion count is kept.
    pub fn reset_intent(&mut self, intent: &str, now: DateTime<Utc>) -> bool {
        match self.fulfilled_intents.get_mut(intent) {
            Some(record) => {
                record.fulfilled = false;
                self.updated_at = now;
                true
            }
            None => false,
        }
    }

    /// True iff the top entry has the same intent and is younger than `window`.
    pub fn is_continuation(&self, intent: &str, now: DateTime<Utc>, window: TimeDelta) -> bool {
        match self.top() {
            Some(top) => top.intent == intent && top.age(now) < window,
            None => false,
        }
    }

    /// Names of intents currently marked fulfilled, in name order.
    pub fn fulfilled_intent_names(&self) -> Vec<&str> {
        self.fulfilled_intents
            .iter()
            .filter(|(_, record)| record.fulfilled)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn set_current_flow(&mut self, flow_id: &str, step_id: &str, now: DateTime<Utc>) {
        self.current_flow = Some(flow_id.to_string());
        self.current_flow_step = Some(step_id.to_string());
        self.updated_at = now;
    }

    /// Clear the flow mirror if it still points at `flow_id`.
    ///
    /// Returns whether anything was cleared.
    pub fn clear_current_flow_if(&mut self, flow_id: &str, now: DateTime<Utc>) -> bool {
        if self.current_flow.as_deref() == Some(flow_id) {
            self.current_flow = None;
            self.current_flow_step = None;
            self.updated_at = now;
            true
        } else {
            false
        }
    }

    /// Drop stack entries older than `retention` and expired fulfillment records.
    pub fn prune(&mut self, now: DateTime<Utc>, retention: TimeDelta) -> PruneReport {
        let before_items = self.stack.len();
        self.stack.retain(|item| item.age(now) <= retention);

        let before_records = self.fulfilled_intents.len();
        self.fulfilled_intents
            .retain(|_, record| !record.is_expired(now));

        let report = PruneReport {
            stack_items: before_items - self.stack.len(),
            fulfilled_records: before_records - self.fulfilled_intents.len(),
        };
        if !report.is_empty() {
            self.updated_at = now;
        }
        report
    }
}
