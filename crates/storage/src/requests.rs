#![forbid(unsafe_code)]

use trellis_core::AgentId;

use crate::types::NodeKind;

#[derive(Clone, Debug)]
pub struct CreateNodeRequest {
    pub node_id: String,
    pub kind: NodeKind,
    pub title: String,
    pub content: String,
    pub level: i64,
    pub parent_id: Option<String>,
    pub agent: AgentId,
}

/// What to do when an edit turns out to conflict.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditStrategy {
    /// Return the conflict for explicit resolution (default).
    Prompt,
    /// Apply the auto-merge when one exists, else behave like `Prompt`.
    Auto,
    /// Overwrite unconditionally.
    Force,
}

impl EditStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            EditStrategy::Prompt => "prompt",
            EditStrategy::Auto => "auto",
            EditStrategy::Force => "force",
        }
    }
}

impl std::str::FromStr for EditStrategy {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "prompt" => Ok(EditStrategy::Prompt),
            "auto" => Ok(EditStrategy::Auto),
            "force" => Ok(EditStrategy::Force),
            _ => Err("strategy must be one of: prompt, auto, force"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct EditNodeRequest {
    pub node_id: String,
    pub content: String,
    pub agent: AgentId,
    pub summary: Option<String>,
    pub strategy: EditStrategy,
}

/// An agent's explicit choice for a stored conflict.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    AcceptYours,
    AcceptTheirs,
    AcceptAutoMerge,
    ManualMerge,
}

impl Resolution {
    pub fn as_str(self) -> &'static str {
        match self {
            Resolution::AcceptYours => "ACCEPT_YOURS",
            Resolution::AcceptTheirs => "ACCEPT_THEIRS",
            Resolution::AcceptAutoMerge => "ACCEPT_AUTO_MERGE",
            Resolution::ManualMerge => "MANUAL_MERGE",
        }
    }
}

impl std::str::FromStr for Resolution {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ACCEPT_YOURS" => Ok(Resolution::AcceptYours),
            "ACCEPT_THEIRS" => Ok(Resolution::AcceptTheirs),
            "ACCEPT_AUTO_MERGE" => Ok(Resolution::AcceptAutoMerge),
            "MANUAL_MERGE" => Ok(Resolution::ManualMerge),
            _ => Err(
                "resolution must be one of: ACCEPT_YOURS, ACCEPT_THEIRS, ACCEPT_AUTO_MERGE, MANUAL_MERGE",
            ),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ResolveRequest {
    pub node_id: String,
    pub resolution: Resolution,
    pub agent: AgentId,
    pub manual_content: Option<String>,
}
