//! CLI command definitions and dispatch for the `mindstack` binary.
//!
//! Uses clap derive macros for argument parsing. Resource commands follow a
//! noun-verb pattern (e.g., `mindstack memory show`, `mindstack flows list`).

pub mod chat;
pub mod classify;
pub mod display;
pub mod flows;
pub mod init;
pub mod memory;
pub mod validate;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use mindstack_types::avatar::AvatarSelector;

/// Conversational avatar orchestration: intents, flows and prompts.
#[derive(Parser)]
#[command(name = "mindstack", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    /// Avatar to load: `type` or `type/custom_id` (defaults to config.toml).
    #[arg(long, global = true, env = "MINDSTACK_AVATAR", value_parser = parse_avatar)]
    pub avatar: Option<AvatarSelector>,

    #[command(subcommand)]
    pub command: Commands,
}

fn parse_avatar(s: &str) -> Result<AvatarSelector, String> {
    s.parse()
}

#[derive(Subcommand)]
pub enum Commands {
    /// Chat with the avatar in an interactive session.
    Chat {
        /// Resume an existing session instead of starting a new one.
        #[arg(long, short)]
        session: Option<String>,

        /// Show the assembled prompt instead of generating a reply.
        #[arg(long)]
        plan_only: bool,
    },

    /// Classify a message without changing any session.
    Classify {
        /// The message to classify.
        message: String,

        /// Use this session's memory for context.
        #[arg(long, short)]
        session: Option<String>,
    },

    /// Inspect and edit session memory.
    Memory {
        #[command(subcommand)]
        action: memory::MemoryCommand,
    },

    /// Inspect flow definitions and executions.
    Flows {
        #[command(subcommand)]
        action: flows::FlowsCommand,
    },

    /// Load and check the definitions for an avatar.
    Validate {
        /// Also send a test request to the configured provider.
        #[arg(long)]
        ping: bool,
    },

    /// Write starter configuration and sales-avatar definitions.
    Init {
        /// Overwrite files that already exist.
        #[arg(long)]
        force: bool,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Tracing filter for the verbosity flags.
pub fn filter_directives(verbose: u8, quiet: bool) -> &'static str {
    match verbose {
        0 if quiet => "error",
        0 => "warn",
        1 => "info,mindstack_core=debug",
        _ => "trace",
    }
}
