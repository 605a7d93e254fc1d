//! Interactive chat REPL.
//!
//! Each line runs one orchestrated turn: the plan header (intent, flow,
//! template) is shown, then either the reply from the configured provider
//! or, in plan-only mode, the assembled prompt. Slash commands inspect and
//! steer the session. Entry point: `loop_runner::run_chat_loop`.

pub mod banner;
pub mod commands;
pub mod input;
pub mod loop_runner;
