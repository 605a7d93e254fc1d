//! Mindstack CLI entry point.
//!
//! Binary name: `mindstack`
//!
//! Parses CLI arguments, sets up tracing, wires the engine and dispatches to
//! the command handler. The periodic sweeper runs for the lifetime of the
//! command and is stopped before exit.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;
use tokio_util::sync::CancellationToken;

use cli::{Cli, Commands};
use mindstack_infra::filesystem::resolve_data_dir;
use mindstack_observe::tracing_setup::{init_tracing, shutdown_tracing};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli::filter_directives(cli.verbose, cli.quiet), cli.otel)
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Commands that must work without a loadable engine.
    match &cli.command {
        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            generate(*shell, &mut cmd, "mindstack", &mut std::io::stdout());
            return Ok(());
        }
        Commands::Init { force } => {
            return cli::init::init(&resolve_data_dir(), *force, cli.json).await;
        }
        Commands::Validate { ping } => {
            return cli::validate::validate(&resolve_data_dir(), cli.avatar.clone(), *ping, cli.json)
                .await;
        }
        _ => {}
    }

    let state = AppState::init(cli.avatar.clone()).await?;
    let cancel = CancellationToken::new();
    let sweeper = state.spawn_sweeper(cancel.clone());

    let result = match cli.command {
        Commands::Chat { session, plan_only } => {
            cli::chat::loop_runner::run_chat_loop(&state, session, plan_only).await
        }
        Commands::Classify { message, session } => {
            cli::classify::classify(&state, &message, session.as_deref(), cli.json).await
        }
        Commands::Memory { action } => {
            cli::memory::handle_memory_command(action, &state, cli.json).await
        }
        Commands::Flows { action } => {
            cli::flows::handle_flows_command(action, &state, cli.json).await
        }
        Commands::Completions { .. } | Commands::Init { .. } | Commands::Validate { .. } => {
            unreachable!("handled above")
        }
    };

    cancel.cancel();
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "Sweeper task ended abnormally");
    }
    result
}
