//! Shared domain types for Mindstack.
//!
//! This crate contains the domain types used across the engine: session
//! memory, intent and flow definitions, prompt templates, avatar selection,
//! engine configuration and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod avatar;
pub mod config;
pub mod error;
pub mod flow;
pub mod intent;
pub mod llm;
pub mod memory;
pub mod prompt;
