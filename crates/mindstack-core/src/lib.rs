//! Engine logic and port definitions for Mindstack.
//!
//! This crate defines the "ports" (repository, provider, definition and
//! knowledge traits) that the infrastructure layer implements, plus the
//! session memory store, intent classifier, flow engine, prompt assembler
//! and the orchestrator tying them together. It depends only on
//! `mindstack-types`, never on `mindstack-infra` or any database/IO crate.

pub mod definitions;
pub mod flow;
pub mod intent;
pub mod knowledge;
pub mod llm;
pub mod memory;
pub mod orchestrator;
pub mod prompt;

#[cfg(test)]
pub(crate) mod testing;
