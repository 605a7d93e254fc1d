//! Shared terminal formatting for turn plans, classifications and errors.

use console::style;

use mindstack_core::orchestrator::{FlowEvent, TurnPlan};
use mindstack_types::error::MindError;
use mindstack_types::intent::IntentClassification;

/// Shorten `text` to at most `max` characters, marking the cut with `...`.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// `intent (0.90, keyword_match)` plus a continuation marker.
pub fn classification_summary(classification: &IntentClassification) -> String {
    let continuation = if classification.is_continuation {
        ", continuation"
    } else {
        ""
    };
    format!(
        "{} ({:.2}, {}{continuation})",
        classification.intent, classification.confidence, classification.source
    )
}

/// One line describing the flow state after a turn, if any.
pub fn flow_summary(plan: &TurnPlan) -> Option<String> {
    let execution = plan.flow.as_ref();
    match (plan.flow_event, execution) {
        (FlowEvent::None, _) => None,
        (FlowEvent::TimedOut, _) => Some("previous flow timed out".to_string()),
        (FlowEvent::Completed, Some(e)) => Some(format!("{} completed", e.flow_id)),
        (event, Some(e)) => Some(format!("{} {} at step {}", e.flow_id, event, e.current_step)),
        (event, None) => Some(event.to_string()),
    }
}

/// Dimmed plan header printed before the reply.
pub fn print_plan_header(plan: &TurnPlan) {
    let mut parts = vec![format!("intent: {}", classification_summary(&plan.classification))];
    if let Some(original) = &plan.gated_from {
        parts.push(format!("{original} already fulfilled, using {}", plan.intent));
    }
    if let Some(flow) = flow_summary(plan) {
        parts.push(format!("flow: {flow}"));
    }
    parts.push(format!("template: {}", plan.prompt.template_id));
    println!("  {}", style(parts.join(" | ")).dim());
}

/// Print the assembled prompt (plan-only mode).
pub fn print_prompt(plan: &TurnPlan) {
    println!();
    println!("  {}", style("System").bold());
    for line in plan.prompt.system_prompt.lines() {
        println!("  {}", style(line).dim());
    }
    println!();
    println!("  {}", style("User").bold());
    for line in plan.prompt.user_prompt.lines() {
        println!("  {}", style(line).dim());
    }
    println!();
}

/// Generic message for the user; the detail goes to the log.
pub fn print_turn_error(error: &MindError) {
    tracing::error!(error = %error, configuration = error.is_configuration(), "Turn failed");
    match error {
        MindError::InvalidInput(reason) => {
            eprintln!("\n  {} {reason}\n", style("!").yellow().bold());
        }
        _ => {
            eprintln!("\n  {} {}", style("!").red().bold(), error.user_message());
            eprintln!("  {}\n", style("Run with -v for details.").dim());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mindstack_types::intent::ClassificationSource;

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 8), "abcde...");
        assert_eq!(truncate("ééééé", 4), "é...");
    }

    #[test]
    fn test_classification_summary() {
        let classification = IntentClassification {
            intent: "pricing_question".to_string(),
            confidence: 0.9,
            requires_flow: false,
            flow_name: None,
            is_continuation: true,
            source: ClassificationSource::KeywordMatch,
        };
        assert_eq!(
            classification_summary(&classification),
            "pricing_question (0.90, keyword_match, continuation)"
        );
    }
}
