//! Flow definitions, advancement rules and the flow state machine.

pub mod advancement;
pub mod definition;
pub mod engine;
pub mod repository;
pub mod selector;

pub use advancement::{AdvanceDecision, AdvancementRegistry, StepAdvancement};
pub use definition::FlowCatalog;
pub use engine::FlowEngine;
pub use repository::FlowRepository;
pub use selector::{FirstSuccessor, NextStepSelector};
