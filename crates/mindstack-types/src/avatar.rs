//! Avatar selection and persona types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which definition set drives the engine.
///
/// A standard avatar uses only its type's documents; a custom avatar layers
/// its own intents and flows on top of the standard set for its type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AvatarSelector {
    Standard { avatar_type: String },
    Custom { avatar_type: String, avatar_id: String },
}

impl AvatarSelector {
    pub fn standard(avatar_type: impl Into<String>) -> Self {
        AvatarSelector::Standard {
            avatar_type: avatar_type.into(),
        }
    }

    pub fn custom(avatar_type: impl Into<String>, avatar_id: impl Into<String>) -> Self {
        AvatarSelector::Custom {
            avatar_type: avatar_type.into(),
            avatar_id: avatar_id.into(),
        }
    }

    pub fn avatar_type(&self) -> &str {
        match self {
            AvatarSelector::Standard { avatar_type } => avatar_type,
            AvatarSelector::Custom { avatar_type, .. } => avatar_type,
        }
    }

    pub fn custom_id(&self) -> Option<&str> {
        match self {
            AvatarSelector::Standard { .. } => None,
            AvatarSelector::Custom { avatar_id, .. } => Some(avatar_id),
        }
    }
}

impl fmt::Display for AvatarSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AvatarSelector::Standard { avatar_type } => write!(f, "{avatar_type}"),
            AvatarSelector::Custom {
                avatar_type,
                avatar_id,
            } => write!(f, "{avatar_type}/{avatar_id}"),
        }
    }
}

/// Parses `type` or `type/custom_id`.
impl FromStr for AvatarSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('/') {
            None if !s.is_empty() => Ok(AvatarSelector::standard(s)),
            Some((t, id)) if !t.is_empty() && !id.is_empty() && !id.contains('/') => {
                Ok(AvatarSelector::custom(t, id))
            }
            _ => Err(format!("invalid avatar selector: '{s}'")),
        }
    }
}

/// Persona fields substituted into prompt templates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AvatarProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub specializations: Vec<String>,
    #[serde(default)]
    pub offerings: Vec<String>,
    #[serde(default)]
    pub mission: String,
    /// Name of the person the avatar is talking to, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterpart_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterpart_company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterpart_role: Option<String>,
}
