//! Message domain types.
//!
//! A conversation is an ordered list of [`Message`]s. Each role is its own
//! variant, so an assistant turn that requests tools and one that does not
//! are matched exhaustively instead of probing optional fields.
//!
//! On the wire a message is the flat `{role, content, tool_calls?, tool_call_id?}`
//! record every chat-completion style backend understands.

use serde::{Deserialize, Serialize};

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions
    System,
    /// The end user
    User,
    /// The model
    Assistant,
    /// Tool execution result
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Unique ID for this tool call
    pub id: String,

    /// Function name as exposed to the model
    pub name: String,

    /// Arguments as a serialized JSON string
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Parse the argument payload. Malformed JSON yields an empty object.
    pub fn parsed_arguments(&self) -> serde_json::Value {
        match serde_json::from_str::<serde_json::Value>(&self.arguments) {
            Ok(value) if value.is_object() => value,
            _ => serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireMessage", try_from = "WireMessage")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    /// Assistant text with no tool requests.
    Assistant {
        content: String,
    },
    /// Assistant turn carrying at least one tool request. Content may be empty.
    AssistantToolCalls {
        content: String,
        tool_calls: Vec<ToolCallRequest>,
    },
    /// Result of one tool call, answering `tool_call_id`.
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: content.into(),
        }
    }

    /// Assistant message with tool calls. An empty call list degrades to a
    /// plain assistant message.
    pub fn assistant_with_tool_calls(
        content: impl Into<String>,
        tool_calls: Vec<ToolCallRequest>,
    ) -> Self {
        if tool_calls.is_empty() {
            Self::assistant(content)
        } else {
            Self::AssistantToolCalls {
                content: content.into(),
                tool_calls,
            }
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Self::System { .. } => Role::System,
            Self::User { .. } => Role::User,
            Self::Assistant { .. } | Self::AssistantToolCalls { .. } => Role::Assistant,
            Self::Tool { .. } => Role::Tool,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::System { content }
            | Self::User { content }
            | Self::Assistant { content }
            | Self::AssistantToolCalls { content, .. }
            | Self::Tool { content, .. } => content,
        }
    }

    /// Tool requests carried by an assistant message; empty for every other role.
    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        match self {
            Self::AssistantToolCalls { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            Self::Tool { tool_call_id, .. } => Some(tool_call_id),
            _ => None,
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Self::System { .. })
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Self::User { .. })
    }
}

/// Flat serialized form of a [`Message`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireMessage {
    role: Role,

    #[serde(default)]
    content: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ToolCallRequest>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<Message> for WireMessage {
    fn from(message: Message) -> Self {
        match message {
            Message::System { content } => Self::plain(Role::System, content),
            Message::User { content } => Self::plain(Role::User, content),
            Message::Assistant { content } => Self::plain(Role::Assistant, content),
            Message::AssistantToolCalls {
                content,
                tool_calls,
            } => Self {
                role: Role::Assistant,
                content,
                tool_calls,
                tool_call_id: None,
            },
            Message::Tool {
                tool_call_id,
                content,
            } => Self {
                role: Role::Tool,
                content,
                tool_calls: Vec::new(),
                tool_call_id: Some(tool_call_id),
            },
        }
    }
}

impl WireMessage {
    fn plain(role: Role, content: String) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

impl TryFrom<WireMessage> for Message {
    type Error = String;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        Ok(match wire.role {
            Role::System => Message::System {
                content: wire.content,
            },
            Role::User => Message::User {
                content: wire.content,
            },
            Role::Assistant => Message::assistant_with_tool_calls(wire.content, wire.tool_calls),
            Role::Tool => Message::Tool {
                tool_call_id: wire
                    .tool_call_id
                    .ok_or_else(|| "tool message without tool_call_id".to_string())?,
                content: wire.content,
            },
        })
    }
}
