//! Session memory CLI commands: list, show, reset-intent.

use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use mindstack_core::memory::MindStateRepository;
use mindstack_types::memory::MindStateStack;

use crate::cli::display::truncate;
use crate::state::AppState;

#[derive(Subcommand)]
pub enum MemoryCommand {
    /// List sessions with stored memory, most recent first.
    #[command(alias = "ls")]
    List {
        /// Maximum number of sessions to show.
        #[arg(long, short, default_value = "20")]
        limit: i64,
    },

    /// Show a session's intent stack, fulfilled intents and flow history.
    Show {
        session_id: String,
    },

    /// Allow a fulfilled intent to run again.
    #[command(name = "reset-intent")]
    ResetIntent {
        session_id: String,
        intent: String,
    },
}

pub async fn handle_memory_command(cmd: MemoryCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        MemoryCommand::List { limit } => list_sessions(state, limit, json).await,
        MemoryCommand::Show { session_id } => show_session(state, &session_id, json).await,
        MemoryCommand::ResetIntent { session_id, intent } => {
            reset_intent(state, &session_id, &intent, json).await
        }
    }
}

async fn list_sessions(state: &AppState, limit: i64, json: bool) -> Result<()> {
    let memory = state.orchestrator.memory();
    let session_ids = memory
        .repo()
        .list_sessions(Some(limit))
        .await
        .context("Failed to list sessions")?;

    let mut sessions = Vec::with_capacity(session_ids.len());
    for id in &session_ids {
        if let Some(stack) = memory.peek(id).await? {
            sessions.push(stack);
        }
    }

    if json {
        let rows: Vec<serde_json::Value> = sessions
            .iter()
            .map(|s| {
                serde_json::json!({
                    "session_id": s.session_id,
                    "intents": s.stack.len(),
                    "last_intent": s.top().map(|i| i.intent.as_str()),
                    "current_flow": s.current_flow,
                    "updated_at": s.updated_at,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!();
        println!(
            "  {} No sessions yet. Start one with: {}",
            style("i").blue().bold(),
            style("mindstack chat").cyan()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Session").fg(Color::White),
        Cell::new("Intents").fg(Color::White),
        Cell::new("Last intent").fg(Color::White),
        Cell::new("Flow").fg(Color::White),
        Cell::new("Updated").fg(Color::White),
    ]);

    for s in &sessions {
        let flow = match (&s.current_flow, &s.current_flow_step) {
            (Some(flow), Some(step)) => format!("{flow}/{step}"),
            (Some(flow), None) => flow.clone(),
            _ => "-".to_string(),
        };
        table.add_row(vec![
            Cell::new(truncate(&s.session_id, 36)).fg(Color::Cyan),
            Cell::new(s.stack.len()).fg(Color::White),
            Cell::new(s.top().map(|i| i.intent.as_str()).unwrap_or("-")).fg(Color::White),
            Cell::new(flow).fg(Color::Yellow),
            Cell::new(s.updated_at.format("%Y-%m-%d %H:%M").to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} session{}",
        style(sessions.len()).bold(),
        if sessions.len() == 1 { "" } else { "s" }
    );
    println!();
    Ok(())
}

async fn show_session(state: &AppState, session_id: &str, json: bool) -> Result<()> {
    let memory = state
        .orchestrator
        .session_memory(session_id)
        .await
        .with_context(|| format!("Failed to load session '{session_id}'"))?;

    let Some(memory) = memory else {
        anyhow::bail!("No memory stored for session '{session_id}'");
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&memory)?);
        return Ok(());
    }

    print_memory(&memory);
    Ok(())
}

/// Styled view of one session's memory.
pub fn print_memory(memory: &MindStateStack) {
    println!();
    println!("  Session {}", style(&memory.session_id).cyan().bold());
    if let Some(flow) = &memory.current_flow {
        println!(
            "  Active flow: {} at {}",
            style(flow).yellow(),
            style(memory.current_flow_step.as_deref().unwrap_or("?")).yellow()
        );
    }
    println!();

    if memory.stack.is_empty() {
        println!("  {}", style("No intents on the stack.").dim());
    } else {
        let mut table = Table::new();
        table.load_preset(presets::UTF8_FULL_CONDENSED);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("Time").fg(Color::White),
            Cell::new("Intent").fg(Color::White),
            Cell::new("Confidence").fg(Color::White),
            Cell::new("Source").fg(Color::White),
        ]);
        for item in memory.stack.iter().rev() {
            let source = item
                .metadata
                .get("source")
                .and_then(|v| v.as_str())
                .unwrap_or("-");
            table.add_row(vec![
                Cell::new(item.timestamp.format("%H:%M:%S").to_string()).fg(Color::DarkGrey),
                Cell::new(&item.intent).fg(Color::Cyan),
                Cell::new(format!("{:.2}", item.confidence)).fg(Color::Yellow),
                Cell::new(source).fg(Color::DarkGrey),
            ]);
        }
        println!("{table}");
    }

    if !memory.fulfilled_intents.is_empty() {
        println!();
        println!("  {}", style("Fulfilled intents").bold());
        for (intent, record) in &memory.fulfilled_intents {
            let marker = if record.fulfilled && !record.repeatable {
                style("locked").red()
            } else if record.fulfilled {
                style("done").green()
            } else {
                style("open").dim()
            };
            println!(
                "  {:<24} {:<8} x{}  last {}",
                intent,
                marker,
                record.completion_count,
                record.last_used.format("%Y-%m-%d %H:%M")
            );
        }
    }

    if !memory.flow_history.is_empty() {
        println!();
        println!("  {}", style("Flow history").bold());
        for entry in &memory.flow_history {
            println!(
                "  {:<24} {:<10} {} -> {}",
                entry.flow_id,
                entry.status.to_string(),
                entry.started_at.format("%H:%M:%S"),
                entry.ended_at.format("%H:%M:%S")
            );
        }
    }
    println!();
}

async fn reset_intent(state: &AppState, session_id: &str, intent: &str, json: bool) -> Result<()> {
    let reset = state
        .orchestrator
        .reset_intent(session_id, intent)
        .await
        .with_context(|| format!("Failed to reset '{intent}' for session '{session_id}'"))?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "session_id": session_id,
                "intent": intent,
                "reset": reset,
            }))?
        );
        return Ok(());
    }

    println!();
    if reset {
        println!(
            "  {} '{}' can run again in session {}",
            style("✓").green().bold(),
            style(intent).cyan(),
            style(session_id).dim()
        );
    } else {
        println!(
            "  {} '{}' was not fulfilled in session {}",
            style("i").blue().bold(),
            style(intent).cyan(),
            style(session_id).dim()
        );
    }
    println!();
    Ok(())
}
