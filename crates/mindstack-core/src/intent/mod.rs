//! Intent catalogs and classification.

pub mod catalog;
pub mod classifier;

pub use catalog::IntentCatalog;
pub use classifier::{ClassifierSettings, IntentClassifier};
