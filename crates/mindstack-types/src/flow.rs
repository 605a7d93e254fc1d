//! Flow definition and execution types for Mindstack.
//!
//! A flow is a small scripted interaction (collect an email, walk through a
//! demo) made of steps. `FlowDefinition` is the static graph loaded from
//! `flows.yaml`; `FlowExecution` is one session's live progress through it.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::secs_to_delta;

/// Successor id meaning "the flow is done".
pub const FLOW_COMPLETED: &str = "completed";

fn default_true() -> bool {
    true
}

fn default_max_duration_secs() -> u64 {
    1800
}

/// Static flow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub entry_intents: Vec<String>,
    #[serde(default)]
    pub priority: i32,
    pub steps: Vec<FlowStep>,
    #[serde(default)]
    pub success_criteria: Vec<String>,
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u64,
    #[serde(default = "default_true")]
    pub repeatable: bool,
    /// Advancement rule used by steps that do not name their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advancement: Option<String>,
}

impl FlowDefinition {
    pub fn step(&self, step_id: &str) -> Option<&FlowStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub fn first_step(&self) -> Option<&FlowStep> {
        self.steps.first()
    }

    pub fn is_entry_intent(&self, intent: &str) -> bool {
        self.entry_intents.iter().any(|i| i == intent)
    }

    pub fn max_duration(&self) -> TimeDelta {
        secs_to_delta(self.max_duration_secs)
    }

    /// Advancement rule for a step: the step's own, else the flow's.
    pub fn advancement_for<'a>(&'a self, step: &'a FlowStep) -> Option<&'a str> {
        step.advancement
            .as_deref()
            .or(self.advancement.as_deref())
    }
}

/// One node of a flow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowStep {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub required: bool,
    /// Successor step ids, or [`FLOW_COMPLETED`].
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advancement: Option<String>,
    /// Intent whose prompt template renders this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_intent: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowStatus {
    Active,
    Completed,
    Timeout,
    Cancelled,
}

impl FlowStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, FlowStatus::Active)
    }
}

impl fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowStatus::Active => write!(f, "active"),
            FlowStatus::Completed => write!(f, "completed"),
            FlowStatus::Timeout => write!(f, "timeout"),
            FlowStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for FlowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(FlowStatus::Active),
            "completed" => Ok(FlowStatus::Completed),
            "timeout" => Ok(FlowStatus::Timeout),
            "cancelled" => Ok(FlowStatus::Cancelled),
            other => Err(format!("invalid flow status: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepExecutionStatus {
    Active,
    Completed,
    Abandoned,
}

/// Timing record for one visit to a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecution {
    pub step_id: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub status: StepExecutionStatus,
}

/// One session's progress through a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowExecution {
    pub id: Uuid,
    pub session_id: String,
    pub flow_id: String,
    pub current_step: String,
    #[serde(default)]
    pub completed_steps: Vec<String>,
    #[serde(default)]
    pub step_executions: Vec<StepExecution>,
    pub start_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub status: FlowStatus,
    /// Values captured while the flow ran (e.g. `email`).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl FlowExecution {
    /// Fresh execution positioned at `first_step`.
    pub fn start(
        session_id: impl Into<String>,
        flow_id: impl Into<String>,
        first_step: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let first_step = first_step.into();
        Self {
            id: Uuid::now_v7(),
            session_id: session_id.into(),
            flow_id: flow_id.into(),
            current_step: first_step.clone(),
            completed_steps: Vec::new(),
            step_executions: vec![StepExecution {
                step_id: first_step,
                start_time: now,
                end_time: None,
                status: StepExecutionStatus::Active,
            }],
            start_time: now,
            last_activity: now,
            status: FlowStatus::Active,
            context: BTreeMap::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == FlowStatus::Active
    }

    pub fn elapsed(&self, now: DateTime<Utc>) -> TimeDelta {
        now - self.start_time
    }

    pub fn idle_for(&self, now: DateTime<Utc>) -> TimeDelta {
        now - self.last_activity
    }

    /// Mark `step_id` completed. Returns false if it already was.
    pub fn complete_step(&mut self, step_id: &str, now: DateTime<Utc>) -> bool {
        if self.completed_steps.iter().any(|s| s == step_id) {
            return false;
        }
        self.completed_steps.push(step_id.to_string());
        if let Some(exec) = self
            .step_executions
            .iter_mut()
            .rev()
            .find(|e| e.step_id == step_id && e.status == StepExecutionStatus::Active)
        {
            exec.status = StepExecutionStatus::Completed;
            exec.end_time = Some(now);
        }
        self.last_activity = now;
        true
    }

    /// Move to `step_id` and open a step execution for it.
    pub fn enter_step(&mut self, step_id: &str, now: DateTime<Utc>) {
        self.current_step = step_id.to_string();
        self.step_executions.push(StepExecution {
            step_id: step_id.to_string(),
            start_time: now,
            end_time: None,
            status: StepExecutionStatus::Active,
        });
        self.last_activity = now;
    }

    /// Terminal transition. Still-open step executions are closed as abandoned.
    pub fn finish(&mut self, status: FlowStatus, now: DateTime<Utc>) {
        self.status = status;
        for exec in &mut self.step_executions {
            if exec.status == StepExecutionStatus::Active {
                exec.status = StepExecutionStatus::Abandoned;
                exec.end_time = Some(now);
            }
        }
        self.last_activity = now;
    }
}
