//! `mindstack classify`: dry-run intent classification.

use anyhow::{Context, Result};
use console::style;

use crate::cli::display::classification_summary;
use crate::state::AppState;

/// Classify `message` without touching memory or flows.
pub async fn classify(state: &AppState, message: &str, session_id: Option<&str>, json: bool) -> Result<()> {
    let classification = state
        .orchestrator
        .classify(message, session_id)
        .await
        .context("Classification failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&classification)?);
        return Ok(());
    }

    let defs = state.orchestrator.definitions().await;
    let flow = defs.flows.find_by_entry_intent(&classification.intent);
    let template = defs.templates.for_intent(&classification.intent);

    println!();
    println!(
        "  {} {}",
        style("Intent:").bold(),
        style(classification_summary(&classification)).cyan()
    );
    println!(
        "  {} {}",
        style("Classifier:").bold(),
        if state.orchestrator.classifier().has_provider() {
            "provider with keyword fallback"
        } else {
            "keywords only"
        }
    );
    if let Some(flow) = flow {
        println!("  {} {}", style("Starts flow:").bold(), style(&flow.id).yellow());
    } else if classification.requires_flow {
        println!(
            "  {} {}",
            style("!").yellow().bold(),
            "intent requires a flow but none lists it as an entry intent"
        );
    }
    match template {
        Some(t) => println!("  {} {}", style("Template:").bold(), t.id),
        None => println!(
            "  {} no template for '{}'",
            style("!").red().bold(),
            classification.intent
        ),
    }
    println!();
    Ok(())
}
