//! Span attribute names.
//!
//! `mind.*` names describe the turn pipeline (classification, flow and
//! prompt selection). `gen_ai.*` names follow the OTel GenAI semantic
//! conventions for the generation call made after a turn is planned.
//!
//! Usable as constant field names: `info_span!("chat", { GEN_AI_REQUEST_MODEL } = %model)`.

// --- Turn pipeline ---

pub const MIND_SESSION_ID: &str = "mind.session.id";

/// Avatar selector in `type` or `type/custom_id` form.
pub const MIND_AVATAR: &str = "mind.avatar";

/// Intent used for the turn after gating.
pub const MIND_INTENT: &str = "mind.intent";

pub const MIND_INTENT_CONFIDENCE: &str = "mind.intent.confidence";

/// Where the classification came from (provider, keyword, fallback, ...).
pub const MIND_INTENT_SOURCE: &str = "mind.intent.source";

pub const MIND_FLOW_ID: &str = "mind.flow.id";
pub const MIND_FLOW_STEP: &str = "mind.flow.step";

/// What happened to the flow this turn (started, advanced, ...).
pub const MIND_FLOW_EVENT: &str = "mind.flow.event";

pub const MIND_PROMPT_TEMPLATE: &str = "mind.prompt.template_id";

// --- GenAI ---

/// The name of the operation being performed (e.g., "chat").
pub const GEN_AI_OPERATION_NAME: &str = "gen_ai.operation.name";

/// The name of the GenAI provider (e.g., "openai").
pub const GEN_AI_PROVIDER_NAME: &str = "gen_ai.provider.name";

pub const GEN_AI_REQUEST_MODEL: &str = "gen_ai.request.model";
pub const GEN_AI_REQUEST_TEMPERATURE: &str = "gen_ai.request.temperature";
pub const GEN_AI_REQUEST_MAX_TOKENS: &str = "gen_ai.request.max_tokens";
pub const GEN_AI_USAGE_INPUT_TOKENS: &str = "gen_ai.usage.input_tokens";
pub const GEN_AI_USAGE_OUTPUT_TOKENS: &str = "gen_ai.usage.output_tokens";
pub const GEN_AI_RESPONSE_ID: &str = "gen_ai.response.id";

// --- Operation name values ---

/// Reply generation for a planned turn.
pub const OP_CHAT: &str = "chat";
