//! Producer-side invocation payload and conversation types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Validation error for [`RunAgentInput`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    /// A required identifier was empty.
    #[error("required field is empty: {field}")]
    MissingField {
        /// Wire name of the offending field.
        field: &'static str,
    },
}

/// Role of a conversation message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    #[default]
    Assistant,
    User,
    Tool,
}

/// One message in the conversation forwarded to the agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Stable message identifier; generated by the producer when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// For tool-role messages, the call this message answers.
    #[serde(rename = "toolCallId", skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            id: None,
            tool_call_id: None,
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            id: None,
            tool_call_id: None,
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            id: None,
            tool_call_id: None,
        }
    }

    /// Create a tool-result message answering `tool_call_id`.
    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            id: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    /// Set the message id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Tool made available to the agent for this run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    /// JSON Schema of the tool's arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

impl ToolDef {
    /// Create a tool definition.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: None,
        }
    }

    /// Attach the argument schema.
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

/// Contextual value forwarded from the consumer to the agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextEntry {
    /// Human-readable description of what the value is.
    pub description: String,
    pub value: Value,
}

impl ContextEntry {
    /// Create a context entry.
    pub fn new(description: impl Into<String>, value: Value) -> Self {
        Self {
            description: description.into(),
            value,
        }
    }
}

/// Invocation payload for one agent run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunAgentInput {
    #[serde(rename = "threadId")]
    pub thread_id: String,
    #[serde(rename = "runId")]
    pub run_id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub tools: Vec<ToolDef>,
    #[serde(default)]
    pub context: Vec<ContextEntry>,
    /// Initial shared state, if the consumer already holds one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
    /// Opaque properties passed through to the agent unchanged.
    #[serde(rename = "forwardedProps", skip_serializing_if = "Option::is_none")]
    pub forwarded_props: Option<Value>,
}

impl RunAgentInput {
    /// Create an input with the required identifiers.
    pub fn new(thread_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            run_id: run_id.into(),
            messages: Vec::new(),
            tools: Vec::new(),
            context: Vec::new(),
            state: None,
            forwarded_props: None,
        }
    }

    /// Append one message.
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Append messages.
    pub fn with_messages(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.messages.extend(messages);
        self
    }

    /// Append a tool definition.
    pub fn with_tool(mut self, tool: ToolDef) -> Self {
        self.tools.push(tool);
        self
    }

    /// Append a context entry.
    pub fn with_context(mut self, entry: ContextEntry) -> Self {
        self.context.push(entry);
        self
    }

    /// Set the initial state.
    pub fn with_state(mut self, state: Value) -> Self {
        self.state = Some(state);
        self
    }

    /// Set forwarded properties.
    pub fn with_forwarded_props(mut self, props: Value) -> Self {
        self.forwarded_props = Some(props);
        self
    }

    /// Check the required identifiers are present.
    pub fn validate(&self) -> Result<(), InputError> {
        if self.thread_id.is_empty() {
            return Err(InputError::MissingField { field: "threadId" });
        }
        if self.run_id.is_empty() {
            return Err(InputError::MissingField { field: "runId" });
        }
        Ok(())
    }
}
