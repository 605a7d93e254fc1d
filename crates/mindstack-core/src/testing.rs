//! In-memory fakes and builders shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;

use mindstack_types::error::{ConfigurationError, RepositoryError};
use mindstack_types::flow::{FlowDefinition, FlowExecution, FlowStatus, FlowStep};
use mindstack_types::intent::IntentDefinition;
use mindstack_types::llm::{CompletionRequest, CompletionResponse, LlmError, StopReason, Usage};
use mindstack_types::memory::MindStateStack;
use mindstack_types::prompt::PromptTemplate;

use crate::definitions::DefinitionSource;
use crate::flow::FlowRepository;
use crate::llm::LlmProvider;
use crate::memory::MindStateRepository;

// --- Repositories ---

#[derive(Default)]
pub struct InMemoryMindStateRepository {
    states: Mutex<HashMap<String, MindStateStack>>,
    fail_saves: AtomicBool,
}

impl InMemoryMindStateRepository {
    /// Make every subsequent `save` fail with a query error.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl MindStateRepository for InMemoryMindStateRepository {
    async fn load(&self, session_id: &str) -> Result<Option<MindStateStack>, RepositoryError> {
        Ok(self.states.lock().unwrap().get(session_id).cloned())
    }

    async fn save(&self, state: &MindStateStack) -> Result<(), RepositoryError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(RepositoryError::Query("save disabled".to_string()));
        }
        self.states
            .lock()
            .unwrap()
            .insert(state.session_id.clone(), state.clone());
        Ok(())
    }

    async fn list_sessions(&self, limit: Option<i64>) -> Result<Vec<String>, RepositoryError> {
        let states = self.states.lock().unwrap();
        let mut sorted: Vec<&MindStateStack> = states.values().collect();
        sorted.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        let limit = limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        Ok(sorted
            .into_iter()
            .take(limit)
            .map(|s| s.session_id.clone())
            .collect())
    }
}

/// Clones share storage, so a second engine can "restart" over the same data.
#[derive(Clone, Default)]
pub struct InMemoryFlowRepository {
    executions: Arc<Mutex<Vec<FlowExecution>>>,
}

impl FlowRepository for InMemoryFlowRepository {
    async fn save_execution(&self, execution: &FlowExecution) -> Result<(), RepositoryError> {
        let mut executions = self.executions.lock().unwrap();
        match executions.iter_mut().find(|e| e.id == execution.id) {
            Some(existing) => *existing = execution.clone(),
            None => executions.push(execution.clone()),
        }
        Ok(())
    }

    async fn load_active(&self) -> Result<Vec<FlowExecution>, RepositoryError> {
        Ok(self
            .executions
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.status == FlowStatus::Active)
            .cloned()
            .collect())
    }

    async fn list_for_session(
        &self,
        session_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<FlowExecution>, RepositoryError> {
        let mut found: Vec<FlowExecution> = self
            .executions
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        found.truncate(limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX));
        Ok(found)
    }
}

// --- Provider ---

/// Replies with queued answers in order, then repeats the last one.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<String>>,
    last: Mutex<Option<String>>,
    fail: bool,
    calls: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedProvider {
    pub fn replying(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            last: Mutex::new(None),
            fail: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::replying(&[])
        }
    }

    /// Handle to the requests received, usable after the provider is boxed.
    pub fn calls(&self) -> Arc<Mutex<Vec<CompletionRequest>>> {
        self.calls.clone()
    }
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(LlmError::Provider {
                message: "scripted failure".to_string(),
            });
        }
        let next = self.replies.lock().unwrap().pop_front();
        let content = match next {
            Some(reply) => {
                *self.last.lock().unwrap() = Some(reply.clone());
                reply
            }
            None => self.last.lock().unwrap().clone().unwrap_or_default(),
        };
        Ok(CompletionResponse {
            id: "resp-scripted".to_string(),
            content,
            model: "scripted-model".to_string(),
            stop_reason: StopReason::EndTurn,
            usage: Usage::default(),
        })
    }
}

/// Answers with the intent named by a keyword in the message and records how
/// many calls overlap. Messages containing `[hold]` wait for [`Self::release`].
#[derive(Clone)]
pub struct GatedProvider {
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    gate: Arc<Semaphore>,
}

impl GatedProvider {
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            gate: Arc::new(Semaphore::new(0)),
        }
    }

    /// Let one held call finish.
    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of calls seen running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl LlmProvider for GatedProvider {
    fn name(&self) -> &str {
        "gated"
    }

    fn model(&self) -> &str {
        "gated-model"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let input = request
            .messages
            .last()
            .map(|m| m.content.to_lowercase())
            .unwrap_or_default();

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if input.contains("[hold]") {
            self.gate.acquire().await.unwrap().forget();
        } else {
            for _ in 0..16 {
                tokio::task::yield_now().await;
            }
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let intent = if input.contains("demo") {
            "demo_request"
        } else if input.contains("cost") {
            "pricing_question"
        } else {
            "general_question"
        };
        Ok(CompletionResponse {
            id: "resp-gated".to_string(),
            content: intent.to_string(),
            model: "gated-model".to_string(),
            stop_reason: StopReason::EndTurn,
            usage: Usage::default(),
        })
    }
}

// --- Definitions ---

pub fn step(id: &str, next: &[&str]) -> FlowStep {
    FlowStep {
        id: id.to_string(),
        name: String::new(),
        required: true,
        next_steps: next.iter().map(|n| n.to_string()).collect(),
        advancement: None,
        prompt_intent: None,
    }
}

pub fn flow(id: &str, entry_intents: &[&str], priority: i32, steps: Vec<FlowStep>) -> FlowDefinition {
    FlowDefinition {
        id: id.to_string(),
        name: String::new(),
        description: String::new(),
        entry_intents: entry_intents.iter().map(|i| i.to_string()).collect(),
        priority,
        steps,
        success_criteria: Vec::new(),
        max_duration_secs: 1800,
        repeatable: true,
        advancement: None,
    }
}

pub fn template(id: &str, intent: &str) -> PromptTemplate {
    PromptTemplate {
        id: id.to_string(),
        intent: intent.to_string(),
        system_prompt: format!("system for {intent}"),
        user_prompt_template: "{user_message}".to_string(),
        variables: Vec::new(),
    }
}

/// Fixed definition documents.
///
/// - `sales`: greeting, pricing, demo (with a two-step `demo` flow), a
///   non-repeatable signup and the fallback intents
/// - `support`: greeting and fallbacks, no flows
/// - `broken`: a flow with a dangling successor
/// - custom `acme`: adds `warranty_question`
pub struct StaticDefinitionSource {
    intents: HashMap<String, Vec<IntentDefinition>>,
    flows: HashMap<String, Vec<FlowDefinition>>,
    templates: Vec<PromptTemplate>,
    custom_intents: HashMap<String, Vec<IntentDefinition>>,
}

impl StaticDefinitionSource {
    pub fn sample() -> Self {
        let greeting = IntentDefinition::new("greeting", &["hello"]);
        let general = IntentDefinition::new("general_question", &[]);
        let uncategorized = IntentDefinition::new("uncategorized_comment", &[]);
        let mut demo = IntentDefinition::new("demo_request", &["demo"]);
        demo.requires_flow = true;
        demo.flow_name = Some("demo".to_string());
        let mut signup = IntentDefinition::new("signup", &["sign up"]);
        signup.repeatable = false;

        let mut schedule = step("schedule", &["completed"]);
        schedule.advancement = Some("email_capture".to_string());
        schedule.prompt_intent = Some("collect_email".to_string());
        let demo_flow = flow(
            "demo",
            &["demo_request"],
            1,
            vec![step("qualify", &["schedule"]), schedule],
        );

        let mut intents = HashMap::new();
        intents.insert(
            "sales".to_string(),
            vec![
                greeting.clone(),
                IntentDefinition::new("pricing_question", &["price", "cost"]),
                demo,
                signup,
                general.clone(),
                uncategorized.clone(),
            ],
        );
        intents.insert(
            "support".to_string(),
            vec![greeting.clone(), general.clone(), uncategorized.clone()],
        );
        intents.insert("broken".to_string(), vec![greeting, general, uncategorized]);

        let mut flows = HashMap::new();
        flows.insert("sales".to_string(), vec![demo_flow]);
        flows.insert(
            "broken".to_string(),
            vec![flow("loop", &["greeting"], 0, vec![step("s1", &["nowhere"])])],
        );

        let mut custom_intents = HashMap::new();
        custom_intents.insert(
            "acme".to_string(),
            vec![IntentDefinition::new("warranty_question", &["warranty"])],
        );

        Self {
            intents,
            flows,
            templates: vec![
                template("greeting", "greeting"),
                template("pricing", "pricing_question"),
                template("demo", "demo_request"),
                template("signup", "signup"),
                template("general", "general_question"),
                template("uncategorized", "uncategorized_comment"),
                template("qualify", "qualify"),
                template("collect_email", "collect_email"),
                template("warranty", "warranty_question"),
            ],
            custom_intents,
        }
    }
}

impl DefinitionSource for StaticDefinitionSource {
    async fn load_intent_definitions(
        &self,
        avatar_type: &str,
    ) -> Result<Vec<IntentDefinition>, ConfigurationError> {
        Ok(self.intents.get(avatar_type).cloned().unwrap_or_default())
    }

    async fn load_flow_definitions(
        &self,
        avatar_type: &str,
    ) -> Result<Vec<FlowDefinition>, ConfigurationError> {
        Ok(self.flows.get(avatar_type).cloned().unwrap_or_default())
    }

    async fn load_prompt_templates(&self) -> Result<Vec<PromptTemplate>, ConfigurationError> {
        Ok(self.templates.clone())
    }

    async fn load_custom_intents(
        &self,
        avatar_id: &str,
    ) -> Result<Option<Vec<IntentDefinition>>, ConfigurationError> {
        Ok(self.custom_intents.get(avatar_id).cloned())
    }

    async fn load_custom_flows(
        &self,
        avatar_id: &str,
    ) -> Result<Option<Vec<FlowDefinition>>, ConfigurationError> {
        Ok(self
            .custom_intents
            .contains_key(avatar_id)
            .then(Vec::new))
    }
}
