//! Main chat loop.
//!
//! Runs one orchestrated turn per line: plan, generate (or show the prompt),
//! then report delivery with `complete_turn` so fulfillment is tracked.

use std::io::Write;
use std::time::Instant;

use console::style;
use tracing::{Instrument, info_span, warn};
use uuid::Uuid;

use mindstack_core::llm::BoxLlmProvider;
use mindstack_core::orchestrator::TurnPlan;
use mindstack_observe::attrs;
use mindstack_types::config::ProviderSettings;
use mindstack_types::llm::{CompletionRequest, CompletionResponse, LlmError, Message};

use crate::cli::display::{print_plan_header, print_prompt, print_turn_error};
use crate::cli::memory::print_memory;
use crate::state::AppState;

use super::banner::print_welcome_banner;
use super::commands::{self, ChatCommand};
use super::input::{ChatInput, InputEvent};

/// Messages of chat history passed to the assembler.
const HISTORY_WINDOW: usize = 10;

/// Build the generation request for a planned turn.
pub fn generation_request(plan: &TurnPlan, settings: Option<&ProviderSettings>) -> CompletionRequest {
    let (max_tokens, temperature) = settings
        .map(|s| (s.generation_max_tokens, s.generation_temperature))
        .unwrap_or((1024, 0.7));
    CompletionRequest::simple(
        plan.prompt.system_prompt.clone(),
        plan.prompt.user_prompt.clone(),
        max_tokens,
    )
    .with_temperature(temperature)
}

async fn generate_reply(
    provider: &BoxLlmProvider,
    request: &CompletionRequest,
) -> Result<CompletionResponse, LlmError> {
    let span = info_span!(
        "chat",
        { attrs::GEN_AI_OPERATION_NAME } = attrs::OP_CHAT,
        { attrs::GEN_AI_PROVIDER_NAME } = provider.name(),
        { attrs::GEN_AI_REQUEST_MODEL } = provider.model(),
        { attrs::GEN_AI_REQUEST_MAX_TOKENS } = request.max_tokens,
        { attrs::GEN_AI_REQUEST_TEMPERATURE } = request.temperature.unwrap_or_default(),
        { attrs::GEN_AI_USAGE_INPUT_TOKENS } = tracing::field::Empty,
        { attrs::GEN_AI_USAGE_OUTPUT_TOKENS } = tracing::field::Empty,
        { attrs::GEN_AI_RESPONSE_ID } = tracing::field::Empty,
    );
    let response = provider.complete(request).instrument(span.clone()).await?;
    span.record(attrs::GEN_AI_USAGE_INPUT_TOKENS, response.usage.input_tokens);
    span.record(attrs::GEN_AI_USAGE_OUTPUT_TOKENS, response.usage.output_tokens);
    span.record(attrs::GEN_AI_RESPONSE_ID, response.id.as_str());
    Ok(response)
}

fn new_session_id() -> String {
    Uuid::now_v7().to_string()
}

/// Run the interactive chat loop.
pub async fn run_chat_loop(
    state: &AppState,
    resume_session_id: Option<String>,
    plan_only: bool,
) -> anyhow::Result<()> {
    let orchestrator = &state.orchestrator;
    let mut session_id = resume_session_id.unwrap_or_else(new_session_id);
    let mut show_prompts = plan_only || state.provider.is_none();
    let mut history: Vec<Message> = Vec::new();

    let avatar = orchestrator.avatar();
    let persona = if avatar.name.is_empty() {
        "Mindstack".to_string()
    } else if avatar.company_name.is_empty() {
        avatar.name.clone()
    } else {
        format!("{} from {}", avatar.name, avatar.company_name)
    };
    let selector = orchestrator.definitions().await.selector().to_string();
    print_welcome_banner(
        &selector,
        &persona,
        state.provider.as_ref().map(|p| p.model()),
        &session_id,
    );

    let prompt = format!("  {} ", style("You >").green().bold());
    let (mut chat_input, _writer) = ChatInput::new(prompt)
        .map_err(|e| anyhow::anyhow!("Failed to initialize input: {e}"))?;

    loop {
        let text = match chat_input.read_line().await {
            InputEvent::Eof => {
                println!("\n  {}", style("Session ended.").dim());
                break;
            }
            InputEvent::Interrupted => {
                println!("\n  {}", style("Press Ctrl+D to exit, or keep chatting.").dim());
                continue;
            }
            InputEvent::Message(text) if text.is_empty() => continue,
            InputEvent::Message(text) => text,
        };

        if let Some(cmd) = commands::parse(&text) {
            match cmd {
                ChatCommand::Help => commands::print_help(),
                ChatCommand::Clear => chat_input.clear(),
                ChatCommand::Exit => {
                    println!("\n  {}", style("Session ended.").dim());
                    break;
                }
                ChatCommand::New => {
                    session_id = new_session_id();
                    history.clear();
                    println!("\n  {} New session {}\n", style("*").cyan().bold(), style(&session_id).dim());
                }
                ChatCommand::Memory => match orchestrator.session_memory(&session_id).await {
                    Ok(Some(memory)) => print_memory(&memory),
                    Ok(None) => println!("\n  {}\n", style("Nothing remembered yet.").dim()),
                    Err(e) => print_turn_error(&e),
                },
                ChatCommand::Reset(intent) => match orchestrator.reset_intent(&session_id, &intent).await {
                    Ok(true) => println!("\n  {} {intent} can run again\n", style("✓").green().bold()),
                    Ok(false) => println!("\n  {} {intent} was not fulfilled\n", style("i").blue().bold()),
                    Err(e) => print_turn_error(&e),
                },
                ChatCommand::Cancel => match orchestrator.cancel_flow(&session_id).await {
                    Ok(Some(execution)) => println!(
                        "\n  {} Cancelled {} at step {}\n",
                        style("✓").green().bold(),
                        execution.flow_id,
                        execution.current_step
                    ),
                    Ok(None) => println!("\n  {}\n", style("No active flow.").dim()),
                    Err(e) => print_turn_error(&e),
                },
                ChatCommand::Avatar(selector) => {
                    match orchestrator.switch_avatar(state.definitions.as_ref(), &selector).await {
                        Ok(()) => println!("\n  {} Switched to {selector}\n", style("✓").green().bold()),
                        Err(e) => print_turn_error(&e),
                    }
                }
                ChatCommand::Prompt => {
                    if state.provider.is_none() {
                        println!("\n  {}\n", style("No provider configured; showing prompts.").dim());
                    } else {
                        show_prompts = !show_prompts;
                        let mode = if show_prompts { "prompts" } else { "replies" };
                        println!("\n  {} Showing {mode}\n", style("*").cyan().bold());
                    }
                }
                ChatCommand::Unknown(name) => println!(
                    "\n  {} Unknown command: {}. Type /help for available commands.\n",
                    style("?").yellow().bold(),
                    style(name).dim()
                ),
            }
            continue;
        }

        let window_start = history.len().saturating_sub(HISTORY_WINDOW);
        let plan = match orchestrator
            .handle_message(&session_id, &text, Some(&history[window_start..]))
            .await
        {
            Ok(plan) => plan,
            Err(e) => {
                print_turn_error(&e);
                continue;
            }
        };

        println!();
        print_plan_header(&plan);

        let reply = match (&state.provider, show_prompts) {
            (Some(provider), false) => {
                let request = generation_request(&plan, state.config.provider.as_ref());
                let started = Instant::now();
                match generate_reply(provider, &request).await {
                    Ok(response) => {
                        print!("\n  {} ", style(&persona).cyan().bold());
                        println!("{}", response.content.trim());
                        println!(
                            "  {}",
                            style(format!(
                                "{} tokens, {:.1}s",
                                response.usage.output_tokens,
                                started.elapsed().as_secs_f32()
                            ))
                            .dim()
                        );
                        let _ = std::io::stdout().flush();
                        Some(response.content)
                    }
                    Err(e) => {
                        warn!(error = %e, "Generation failed");
                        eprintln!("\n  {} LLM error: {e}", style("!").red().bold());
                        eprintln!("  {}\n", style("Type a message to retry, /exit to quit.").dim());
                        None
                    }
                }
            }
            _ => {
                print_prompt(&plan);
                Some(String::new())
            }
        };

        // Only a delivered reply counts towards fulfillment.
        let Some(reply) = reply else {
            continue;
        };
        if let Err(e) = orchestrator.complete_turn(&session_id, &plan.intent).await {
            print_turn_error(&e);
        }
        history.push(Message::user(text));
        if !reply.is_empty() {
            history.push(Message::assistant(reply));
        }
        println!();
    }

    chat_input.flush();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::init::write_starter_definitions;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_generation_request_uses_plan_and_settings() {
        let tmp = TempDir::new().unwrap();
        write_starter_definitions(tmp.path(), false).await.unwrap();
        let state = AppState::init_at(tmp.path(), None).await.unwrap();
        let plan = state
            .orchestrator
            .handle_message("s1", "what does it cost?", None)
            .await
            .unwrap();

        let mut settings = ProviderSettings::new("gpt-4o-mini");
        settings.generation_max_tokens = 256;
        let request = generation_request(&plan, Some(&settings));
        assert_eq!(request.max_tokens, 256);
        assert_eq!(request.system.as_deref(), Some(plan.prompt.system_prompt.as_str()));
        assert_eq!(request.messages[0].content, plan.prompt.user_prompt);

        let defaults = generation_request(&plan, None);
        assert_eq!(defaults.max_tokens, 1024);
        assert_eq!(defaults.temperature, Some(0.7));
    }
}
