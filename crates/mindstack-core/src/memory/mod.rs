//! Session memory for Mindstack.
//!
//! This module defines the `MindStateRepository` trait that the infrastructure
//! layer implements, and the `SessionMemoryStore` that owns the per-session
//! intent stack and fulfillment bookkeeping.

pub mod service;
pub mod store;

pub use service::SessionMemoryStore;
pub use store::MindStateRepository;
