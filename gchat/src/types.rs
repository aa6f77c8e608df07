//! Conversation turns and caller-facing request types.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use gprovider::{WireMessage, WireRole};
use serde::{Deserialize, Serialize};

use crate::ChatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub(crate) fn wire(self) -> WireRole {
        match self {
            Self::System => WireRole::System,
            Self::User => WireRole::User,
            Self::Assistant => WireRole::Assistant,
        }
    }
}

impl Display for ChatRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatRole {
    type Err = ChatError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(ChatError::invalid_argument(format!(
                "role must be 'system', 'user' or 'assistant', got '{value}'"
            ))),
        }
    }
}

/// One immutable conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatTurn {
    role: ChatRole,
    content: String,
}

impl ChatTurn {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Builds a turn from an untrusted role name.
    pub fn parse(role: &str, content: impl Into<String>) -> Result<Self, ChatError> {
        Ok(Self::new(role.parse()?, content))
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }

    pub fn role(&self) -> ChatRole {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub(crate) fn to_wire(&self) -> WireMessage {
        WireMessage::new(self.role.wire(), self.content.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TurnPayload {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

/// Request body of both chat endpoints: `{"messages": [{"role", "content"}, ...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChatRequestBody {
    #[serde(default)]
    pub messages: Vec<TurnPayload>,
}

impl ChatRequestBody {
    /// Validates every turn in order; the first bad role fails the whole body.
    pub fn into_turns(self) -> Result<Vec<ChatTurn>, ChatError> {
        self.messages
            .into_iter()
            .map(|message| ChatTurn::parse(&message.role, message.content))
            .collect()
    }
}

/// Shape of each item produced by a streamed chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Structured normalized objects.
    #[default]
    Dict,
    /// One serialized JSON document per item, newline terminated.
    Json,
}

impl FromStr for OutputFormat {
    type Err = ChatError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "dict" => Ok(Self::Dict),
            "json" => Ok(Self::Json),
            other => Err(ChatError::invalid_argument(format!(
                "output format must be 'json' or 'dict', got '{other}'"
            ))),
        }
    }
}
