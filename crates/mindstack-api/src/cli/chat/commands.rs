//! Slash command parsing for the chat loop.
//!
//! Commands start with `/` and inspect or steer the current session.

use console::style;

use mindstack_types::avatar::AvatarSelector;

/// Available slash commands in the chat loop.
#[derive(Debug, PartialEq)]
pub enum ChatCommand {
    Help,
    Clear,
    Exit,
    /// Start over with a fresh session id.
    New,
    /// Show the session's memory.
    Memory,
    /// Allow a fulfilled intent to run again.
    Reset(String),
    /// Cancel the active flow.
    Cancel,
    /// Reload definitions for another avatar.
    Avatar(AvatarSelector),
    /// Toggle between generating replies and showing prompts.
    Prompt,
    /// Unknown command or bad argument.
    Unknown(String),
}

/// Parse user input as a slash command.
///
/// Returns `None` if the input doesn't start with `/`.
pub fn parse(input: &str) -> Option<ChatCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let (cmd, arg) = match trimmed.split_once(' ') {
        Some((cmd, arg)) => (cmd.to_lowercase(), arg.trim()),
        None => (trimmed.to_lowercase(), ""),
    };

    let command = match cmd.as_str() {
        "/help" | "/h" | "/?" => ChatCommand::Help,
        "/clear" | "/cls" => ChatCommand::Clear,
        "/exit" | "/quit" | "/q" => ChatCommand::Exit,
        "/new" => ChatCommand::New,
        "/memory" | "/mem" => ChatCommand::Memory,
        "/cancel" => ChatCommand::Cancel,
        "/prompt" => ChatCommand::Prompt,
        "/reset" if arg.is_empty() => ChatCommand::Unknown("/reset requires an intent".to_string()),
        "/reset" => ChatCommand::Reset(arg.to_string()),
        "/avatar" => match arg.parse::<AvatarSelector>() {
            Ok(selector) => ChatCommand::Avatar(selector),
            Err(_) => ChatCommand::Unknown("/avatar requires type or type/custom_id".to_string()),
        },
        other => ChatCommand::Unknown(other.to_string()),
    };
    Some(command)
}

/// Print the help text listing all available commands.
pub fn print_help() {
    let rows = [
        ("/help", "Show this help message"),
        ("/memory", "Show the session's intents and flow history"),
        ("/reset <intent>", "Allow a fulfilled intent to run again"),
        ("/cancel", "Cancel the active flow"),
        ("/avatar <type[/id]>", "Switch to another avatar's definitions"),
        ("/prompt", "Toggle showing prompts instead of replies"),
        ("/new", "Start a new session"),
        ("/clear", "Clear the screen"),
        ("/exit", "End the chat"),
    ];

    println!();
    println!("  {}", style("Available commands:").bold());
    println!();
    for (command, help) in rows {
        println!("  {:<22} {}", style(command).cyan(), help);
    }
    println!();
    println!("  {}", style("Ctrl+D to exit").dim());
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_help() {
        assert_eq!(parse("/help"), Some(ChatCommand::Help));
        assert_eq!(parse("/h"), Some(ChatCommand::Help));
        assert_eq!(parse("/?"), Some(ChatCommand::Help));
    }

    #[test]
    fn test_parse_exit() {
        assert_eq!(parse("/exit"), Some(ChatCommand::Exit));
        assert_eq!(parse("/QUIT"), Some(ChatCommand::Exit));
    }

    #[test]
    fn test_parse_reset() {
        assert_eq!(
            parse("/reset signup"),
            Some(ChatCommand::Reset("signup".to_string()))
        );
        assert!(matches!(parse("/reset"), Some(ChatCommand::Unknown(_))));
    }

    #[test]
    fn test_parse_avatar() {
        assert_eq!(
            parse("/avatar sales/acme"),
            Some(ChatCommand::Avatar(AvatarSelector::custom("sales", "acme")))
        );
        assert!(matches!(parse("/avatar"), Some(ChatCommand::Unknown(_))));
    }

    #[test]
    fn test_parse_not_command() {
        assert_eq!(parse("how much is it?"), None);
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(
            parse("/foo bar"),
            Some(ChatCommand::Unknown("/foo".to_string()))
        );
    }
}
