//! Welcome banner display for chat sessions.

use console::style;

/// Print the banner at the start of a chat session.
///
/// `model` is `None` in plan-only mode.
pub fn print_welcome_banner(avatar: &str, persona: &str, model: Option<&str>, session_id: &str) {
    println!();
    println!("  * {}", style(persona).cyan().bold());
    println!();
    println!("  {}   {}", style("Avatar:").bold(), style(avatar).dim());
    println!(
        "  {}    {}",
        style("Model:").bold(),
        style(model.unwrap_or("none (plan only)")).dim()
    );
    println!("  {}  {}", style("Session:").bold(), style(session_id).dim());
    println!();
    println!(
        "  {}",
        style("Type /help for commands, Ctrl+D to exit").dim()
    );
    println!("  {}", style("---").dim());
    println!();
}
