//! Flow CLI commands: list definitions, show a session's executions.

use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use mindstack_core::flow::FlowRepository;
use mindstack_types::flow::{FlowDefinition, FlowStatus};

use crate::state::AppState;

#[derive(Subcommand)]
pub enum FlowsCommand {
    /// List the flows defined for the avatar.
    #[command(alias = "ls")]
    List,

    /// Show a session's flow executions, newest first.
    History {
        session_id: String,

        #[arg(long, short, default_value = "20")]
        limit: i64,
    },
}

pub async fn handle_flows_command(cmd: FlowsCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        FlowsCommand::List => list_flows(state, json).await,
        FlowsCommand::History { session_id, limit } => history(state, &session_id, limit, json).await,
    }
}

/// `qualify -> collect_email -> confirm -> completed` following first successors.
pub fn step_path(def: &FlowDefinition) -> String {
    def.steps
        .iter()
        .map(|s| {
            if s.next_steps.len() > 1 {
                format!("{} [{}]", s.id, s.next_steps.join("|"))
            } else {
                s.id.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" -> ")
}

async fn list_flows(state: &AppState, json: bool) -> Result<()> {
    let defs = state.orchestrator.definitions().await;

    if json {
        let flows: Vec<&FlowDefinition> = defs.flows.iter().collect();
        println!("{}", serde_json::to_string_pretty(&flows)?);
        return Ok(());
    }

    if defs.flows.is_empty() {
        println!();
        println!(
            "  {} No flows defined for '{}'.",
            style("i").blue().bold(),
            style(defs.selector()).cyan()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Flow").fg(Color::White),
        Cell::new("Entry intents").fg(Color::White),
        Cell::new("Priority").fg(Color::White),
        Cell::new("Steps").fg(Color::White),
        Cell::new("Repeatable").fg(Color::White),
    ]);

    for def in defs.flows.iter() {
        table.add_row(vec![
            Cell::new(&def.id).fg(Color::Cyan),
            Cell::new(def.entry_intents.join(", ")).fg(Color::White),
            Cell::new(def.priority).fg(Color::Yellow),
            Cell::new(step_path(def)).fg(Color::White),
            Cell::new(if def.repeatable { "yes" } else { "no" }).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("  Flows for '{}'", style(defs.selector()).cyan().bold());
    println!();
    println!("{table}");
    println!();
    Ok(())
}

async fn history(state: &AppState, session_id: &str, limit: i64, json: bool) -> Result<()> {
    let executions = state
        .orchestrator
        .flows()
        .repo()
        .list_for_session(session_id, Some(limit))
        .await
        .with_context(|| format!("Failed to load flows for session '{session_id}'"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&executions)?);
        return Ok(());
    }

    if executions.is_empty() {
        println!();
        println!(
            "  {} No flows have run in session {}.",
            style("i").blue().bold(),
            style(session_id).dim()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Flow").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Step").fg(Color::White),
        Cell::new("Completed steps").fg(Color::White),
        Cell::new("Started").fg(Color::White),
        Cell::new("Last activity").fg(Color::White),
    ]);

    for e in &executions {
        let status_color = match e.status {
            FlowStatus::Active => Color::Yellow,
            FlowStatus::Completed => Color::Green,
            FlowStatus::Timeout | FlowStatus::Cancelled => Color::Red,
        };
        table.add_row(vec![
            Cell::new(&e.flow_id).fg(Color::Cyan),
            Cell::new(e.status.to_string()).fg(status_color),
            Cell::new(&e.current_step).fg(Color::White),
            Cell::new(e.completed_steps.join(", ")).fg(Color::White),
            Cell::new(e.start_time.format("%Y-%m-%d %H:%M:%S").to_string()).fg(Color::DarkGrey),
            Cell::new(e.last_activity.format("%H:%M:%S").to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}
