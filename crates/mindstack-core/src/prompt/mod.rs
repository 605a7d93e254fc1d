//! Prompt templates and assembly.

pub mod assembler;
pub mod templates;

pub use assembler::{PromptAssembler, PromptInputs};
pub use templates::TemplateCatalog;
