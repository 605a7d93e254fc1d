//! Infrastructure layer for Mindstack.
//!
//! Contains implementations of the ports defined in `mindstack-core`:
//! SQLite storage for session memory and flow executions, YAML definition
//! documents on disk, the OpenAI-compatible LLM provider, and the
//! configuration and data-directory helpers.

pub mod config;
pub mod definitions;
pub mod filesystem;
pub mod llm;
pub mod sqlite;
