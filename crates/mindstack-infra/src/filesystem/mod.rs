//! Data directory layout for Mindstack.
//!
//! ```text
//! {data_dir}/
//!   config.toml
//!   mindstack.db
//!   definitions/
//!     prompts.yaml
//!     avatars/{avatar_type}/intents.yaml
//!     avatars/{avatar_type}/flows.yaml
//!     custom/{avatar_id}/intents.yaml
//!     custom/{avatar_id}/flows.yaml
//! ```

use std::path::{Path, PathBuf};

/// Path helpers over one data directory.
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn definitions_dir(&self) -> PathBuf {
        self.root.join("definitions")
    }

    pub fn prompts_path(&self) -> PathBuf {
        self.definitions_dir().join("prompts.yaml")
    }

    /// `{data_dir}/definitions/avatars/{avatar_type}/`.
    pub fn avatar_dir(&self, avatar_type: &str) -> PathBuf {
        self.definitions_dir().join("avatars").join(avatar_type)
    }

    /// `{data_dir}/definitions/custom/{avatar_id}/`.
    pub fn custom_dir(&self, avatar_id: &str) -> PathBuf {
        self.definitions_dir().join("custom").join(avatar_id)
    }

    /// Create the data and definitions directories if missing.
    pub async fn ensure(&self) -> Result<(), std::io::Error> {
        tokio::fs::create_dir_all(self.definitions_dir()).await
    }
}

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `MINDSTACK_DATA_DIR` environment variable
/// 2. `~/.mindstack`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("MINDSTACK_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".mindstack");
    }

    // Last resort: current directory
    PathBuf::from(".mindstack")
}

/// Reject ids that could escape the definitions directory.
pub(crate) fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
