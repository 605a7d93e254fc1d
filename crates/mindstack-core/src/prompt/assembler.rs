//! Prompt assembler.
//!
//! Selects the template for the current flow step (or intent), substitutes
//! placeholders in one pass, then appends retrieved knowledge, chat history
//! and the most recent intents to the user prompt.
//!
//! Placeholder vocabulary:
//! ```text
//! {user_message} {intent} {flow} {flow_step}
//! {avatar_name} {company_name} {specializations} {offerings} {mission}
//! {counterpart_name} {counterpart_company} {counterpart_role}
//! {memory_short} {memory_long}
//! {<key>} for every flow context entry (e.g. {email})
//! ```
//! Unknown placeholders are left untouched.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use mindstack_types::avatar::AvatarProfile;
use mindstack_types::config::{CounterpartDefaults, EngineConfig};
use mindstack_types::error::ConfigurationError;
use mindstack_types::flow::FlowExecution;
use mindstack_types::llm::{Message, MessageRole};
use mindstack_types::memory::MindStateStack;
use mindstack_types::prompt::AssembledPrompt;
use tracing::debug;

use crate::prompt::templates::TemplateCatalog;

/// Everything one `build` call reads.
#[derive(Debug, Clone, Copy)]
pub struct PromptInputs<'a> {
    pub intent: &'a str,
    pub message: &'a str,
    pub avatar: &'a AvatarProfile,
    pub memory: &'a MindStateStack,
    pub rag: Option<&'a [String]>,
    pub history: Option<&'a [Message]>,
    pub flow: Option<&'a FlowExecution>,
}

pub struct PromptAssembler {
    default_system_prompt: Option<String>,
    counterpart: CounterpartDefaults,
    history_depth: usize,
}

impl PromptAssembler {
    pub fn new(
        default_system_prompt: Option<String>,
        counterpart: CounterpartDefaults,
        history_depth: usize,
    ) -> Self {
        Self {
            default_system_prompt: default_system_prompt.filter(|p| !p.trim().is_empty()),
            counterpart,
            history_depth,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.default_system_prompt.clone(),
            config.counterpart.clone(),
            config.history_depth,
        )
    }

    /// Produce the system and user prompts for one turn.
    ///
    /// Fails only when no template matches the flow step or the intent.
    #[tracing::instrument(
        name = "prompt.build",
        skip(self, templates, inputs),
        fields(
            session_id = %inputs.memory.session_id,
            intent = %inputs.intent,
        )
    )]
    pub fn build(
        &self,
        templates: &TemplateCatalog,
        inputs: &PromptInputs<'_>,
    ) -> Result<AssembledPrompt, ConfigurationError> {
        let flow_step = current_flow_step(inputs);
        let template = templates.select(inputs.intent, flow_step)?;
        let vars = self.variables(inputs, flow_step);

        let mut system_prompt = render(&template.system_prompt, &vars);
        if let Some(default) = &self.default_system_prompt {
            system_prompt = if system_prompt.trim().is_empty() {
                default.clone()
            } else {
                format!("{default}\n\n{system_prompt}")
            };
        }

        let mut sections = vec![render(&template.user_prompt_template, &vars)];

        if let Some(rag) = inputs.rag.filter(|r| !r.is_empty()) {
            let lines: Vec<String> = rag.iter().map(|snippet| format!("- {}", snippet.trim())).collect();
            sections.push(format!("Relevant information:\n{}", lines.join("\n")));
        }

        if let Some(history) = inputs.history.filter(|h| !h.is_empty()) {
            let lines: Vec<String> = history
                .iter()
                .map(|m| format!("{}: {}", speaker(&m.role), m.content.trim()))
                .collect();
            sections.push(format!("Conversation so far:\n{}", lines.join("\n")));
        }

        let recent = inputs.memory.recent(self.history_depth);
        if !recent.is_empty() {
            let lines: Vec<String> = recent
                .iter()
                .map(|item| {
                    format!(
                        "- {} ({})",
                        item.intent,
                        item.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
                    )
                })
                .collect();
            sections.push(format!("Recent intents:\n{}", lines.join("\n")));
        }

        let user_prompt = sections
            .into_iter()
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");

        debug!(
            template_id = %template.id,
            system_len = system_prompt.len(),
            user_len = user_prompt.len(),
            "Assembled prompt"
        );

        Ok(AssembledPrompt {
            system_prompt,
            user_prompt,
            template_id: template.id.clone(),
        })
    }

    fn variables(
        &self,
        inputs: &PromptInputs<'_>,
        flow_step: Option<(&str, &str)>,
    ) -> HashMap<String, String> {
        let avatar = inputs.avatar;
        let mut vars = HashMap::new();

        if let Some(flow) = inputs.flow {
            for (key, value) in &flow.context {
                vars.insert(key.clone(), value.clone());
            }
        }

        let (flow_id, step_id) = flow_step.unwrap_or(("", ""));
        let fixed = [
            ("user_message", inputs.message.to_string()),
            ("intent", inputs.intent.to_string()),
            ("flow", flow_id.to_string()),
            ("flow_step", step_id.to_string()),
            ("avatar_name", avatar.name.clone()),
            ("company_name", avatar.company_name.clone()),
            ("specializations", avatar.specializations.join(", ")),
            ("offerings", avatar.offerings.join(", ")),
            ("mission", avatar.mission.clone()),
            (
                "counterpart_name",
                avatar
                    .counterpart_name
                    .clone()
                    .unwrap_or_else(|| self.counterpart.name.clone()),
            ),
            (
                "counterpart_company",
                avatar
                    .counterpart_company
                    .clone()
                    .unwrap_or_else(|| self.counterpart.company.clone()),
            ),
            (
                "counterpart_role",
                avatar
                    .counterpart_role
                    .clone()
                    .unwrap_or_else(|| self.counterpart.role.clone()),
            ),
            ("memory_short", memory_short(inputs.memory, Utc::now())),
            ("memory_long", memory_long(inputs.memory)),
        ];
        for (key, value) in fixed {
            vars.insert(key.to_string(), value);
        }
        vars
    }
}

/// Flow position from the execution when given, else from the memory mirror.
fn current_flow_step<'a>(inputs: &PromptInputs<'a>) -> Option<(&'a str, &'a str)> {
    match inputs.flow {
        Some(flow) if flow.is_active() => Some((flow.flow_id.as_str(), flow.current_step.as_str())),
        _ => {
            let memory: &'a MindStateStack = inputs.memory;
            match (&memory.current_flow, &memory.current_flow_step) {
                (Some(flow), Some(step)) => Some((flow.as_str(), step.as_str())),
                _ => None,
            }
        }
    }
}

/// Most recent intent with its age, e.g. `pricing_question (5s ago)`.
pub fn memory_short(memory: &MindStateStack, now: DateTime<Utc>) -> String {
    match memory.top() {
        Some(item) => format!("{} ({} ago)", item.intent, human_age(item.age(now))),
        None => "none".to_string(),
    }
}

/// Coarse age in the largest whole unit: `42s`, `3m`, `2h`, `1d`.
fn human_age(age: TimeDelta) -> String {
    let secs = age.num_seconds().max(0);
    match secs {
        0..60 => format!("{secs}s"),
        60..3600 => format!("{}m", secs / 60),
        3600..86400 => format!("{}h", secs / 3600),
        _ => format!("{}d", secs / 86400),
    }
}

/// What the session already covered: fulfilled intents and finished flows.
pub fn memory_long(memory: &MindStateStack) -> String {
    let mut parts = Vec::new();
    let fulfilled = memory.fulfilled_intent_names();
    if !fulfilled.is_empty() {
        parts.push(format!("already covered: {}", fulfilled.join(", ")));
    }
    if !memory.flow_history.is_empty() {
        let flows: Vec<String> = memory
            .flow_history
            .iter()
            .map(|h| format!("{} ({})", h.flow_id, h.status))
            .collect();
        parts.push(format!("flows: {}", flows.join(", ")));
    }
    if parts.is_empty() {
        "none".to_string()
    } else {
        parts.join("; ")
    }
}

fn speaker(role: &MessageRole) -> &'static str {
    match role {
        MessageRole::User => "User",
        MessageRole::Assistant => "Assistant",
        MessageRole::System => "System",
    }
}

/// Replace `{name}` tokens found in `vars`, scanning the template once so
/// substituted values are never re-expanded.
pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let name = &after[..close];
                match vars.get(name) {
                    Some(value) if is_placeholder_name(name) => out.push_str(value),
                    _ => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
