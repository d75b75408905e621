use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::ToolCallRequest;

/// A request to be sent to a [`Generator`](crate::Generator).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GenerationRequest {
    /// The input messages, oldest first.
    pub messages: Vec<Message>,
    /// Tools that the model may call.
    pub tools: Vec<ToolSpec>,
}

/// A complete message in the request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// The system instructions.
    System(String),
    /// A user input text.
    User(String),
    /// A previous assistant turn, with the tool calls it asked for.
    Assistant {
        /// Text produced in this turn, possibly empty.
        content: String,
        /// Tool calls requested in this turn.
        tool_calls: Vec<ToolCallRequest>,
    },
    /// The output of a tool call.
    Tool(ToolOutput),
}

impl Message {
    /// Creates an assistant message without tool calls.
    #[inline]
    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Message::Assistant {
            content: content.into(),
            tool_calls: vec![],
        }
    }
}

/// The output of calling a tool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// The identifier of the tool call request this output answers.
    pub call_id: String,
    /// The textual result (or error description) of the call.
    pub content: String,
}

/// Describes a tool that can be used by the model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Name of the tool.
    pub name: String,
    /// Description of the tool.
    pub description: String,
    /// Parameters definition of the tool, as a
    /// [JSON schema](https://json-schema.org/).
    pub parameters: Value,
}
