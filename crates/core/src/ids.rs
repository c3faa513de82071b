#![forbid(unsafe_code)]

/// Agent names become keys in the pending-read and conflict stores, so the
/// accepted alphabet is deliberately narrow.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AgentId(String);

impl AgentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn try_new(value: impl Into<String>) -> Result<Self, AgentIdError> {
        let value = value.into();
        validate_agent_id(&value)?;
        Ok(Self(value))
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AgentIdError {
    Empty,
    TooLong,
    Placeholder,
    InvalidChar { ch: char, index: usize },
}

impl std::fmt::Display for AgentIdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "agent name must not be empty"),
            Self::TooLong => write!(f, "agent name too long (max 50 chars)"),
            Self::Placeholder => {
                write!(f, "pick a unique agent name instead of the placeholder")
            }
            Self::InvalidChar { ch, index } => write!(
                f,
                "agent name may only contain letters, digits, '_' and '-' (found {ch:?} at {index})"
            ),
        }
    }
}

impl std::error::Error for AgentIdError {}

fn validate_agent_id(value: &str) -> Result<(), AgentIdError> {
    if value.is_empty() {
        return Err(AgentIdError::Empty);
    }
    if value.len() > 50 {
        return Err(AgentIdError::TooLong);
    }
    if value == "default_agent" {
        return Err(AgentIdError::Placeholder);
    }
    for (index, ch) in value.chars().enumerate() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-') {
            continue;
        }
        return Err(AgentIdError::InvalidChar { ch, index });
    }
    Ok(())
}
