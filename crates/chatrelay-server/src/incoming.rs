//! The chat request body sent by the browser runtime, and its conversion
//! into the relay's own message and tool types.
use chatrelay::errors::{AgentError, AgentResult};
use chatrelay::models::content::Content;
use chatrelay::models::message::Message;
use chatrelay::models::tool::{Tool, ToolCall};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<IncomingMessage>,
    #[serde(default)]
    pub system: Option<String>,
    /// Tools the browser executes itself, keyed by name
    #[serde(default)]
    pub tools: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<IncomingContent>,
    #[serde(default, rename = "toolInvocations")]
    pub tool_invocations: Vec<ToolInvocation>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum IncomingContent {
    Text(String),
    Parts(Vec<IncomingPart>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum IncomingPart {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        #[serde(default)]
        args: Value,
    },
    #[serde(rename_all = "camelCase")]
    ToolResult {
        tool_call_id: String,
        #[serde(default)]
        result: Value,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub state: String,
    pub tool_call_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub result: Option<Value>,
}

#[derive(Debug, Error, PartialEq)]
#[error("Invalid frontend tool '{name}': {reason}")]
pub struct InvalidToolError {
    pub name: String,
    pub reason: String,
}

impl InvalidToolError {
    fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

// Convert incoming messages to our internal Message type
pub fn convert_messages(incoming: Vec<IncomingMessage>) -> Vec<Message> {
    let mut messages = Vec::new();

    for msg in incoming {
        match msg.role.as_str() {
            "system" => {
                let text = text_of(msg.content);
                if !text.is_empty() {
                    messages.push(Message::system().with_text(text));
                }
            }
            "user" => {
                let text = text_of(msg.content);
                if !text.is_empty() {
                    messages.push(Message::user().with_text(text));
                }
            }
            "assistant" => {
                // Each finished invocation is a complete request/response cycle
                for tool in msg.tool_invocations {
                    if tool.state != "result" {
                        continue;
                    }
                    let call = ToolCall::new(tool.tool_name, tool.args);
                    messages.push(
                        Message::assistant().with_tool_request(tool.tool_call_id.clone(), Ok(call)),
                    );
                    let result = tool.result.unwrap_or(Value::Null);
                    messages.push(
                        Message::user()
                            .with_tool_response(tool.tool_call_id, tool_result(result, false)),
                    );
                }

                let mut reply = Message::assistant();
                match msg.content {
                    Some(IncomingContent::Text(text)) if !text.is_empty() => {
                        reply = reply.with_text(text);
                    }
                    Some(IncomingContent::Parts(parts)) => {
                        for part in parts {
                            reply = match part {
                                IncomingPart::Text { text } => reply.with_text(text),
                                IncomingPart::ToolCall {
                                    tool_call_id,
                                    tool_name,
                                    args,
                                } => reply
                                    .with_tool_request(tool_call_id, Ok(ToolCall::new(tool_name, args))),
                                other => {
                                    warn!("Skipping unsupported assistant part: {:?}", other);
                                    reply
                                }
                            };
                        }
                    }
                    _ => {}
                }
                if !reply.is_empty() {
                    messages.push(reply);
                }
            }
            "tool" => {
                let mut responses = Message::user();
                if let Some(IncomingContent::Parts(parts)) = msg.content {
                    for part in parts {
                        responses = match part {
                            IncomingPart::ToolResult {
                                tool_call_id,
                                result,
                                is_error,
                            } => responses.with_tool_response(tool_call_id, tool_result(result, is_error)),
                            other => {
                                warn!("Skipping unsupported tool part: {:?}", other);
                                responses
                            }
                        };
                    }
                }
                if !responses.is_empty() {
                    messages.push(responses);
                }
            }
            _ => {
                warn!("Unknown role: {}", msg.role);
            }
        }
    }

    messages
}

fn text_of(content: Option<IncomingContent>) -> String {
    match content {
        Some(IncomingContent::Text(text)) => text,
        Some(IncomingContent::Parts(parts)) => parts
            .into_iter()
            .filter_map(|part| match part {
                IncomingPart::Text { text } => Some(text),
                other => {
                    warn!("Skipping unsupported part: {:?}", other);
                    None
                }
            })
            .collect::<Vec<_>>()
            .join(""),
        None => String::new(),
    }
}

/// Interpret a tool result the browser reports back.
///
/// Results in the MCP shape (`{content, isError}`) keep their content items;
/// anything else becomes a single text item.
fn tool_result(result: Value, is_error: bool) -> AgentResult<Vec<Content>> {
    let is_error = is_error
        || result
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false);

    let contents = match result.get("content").cloned().map(serde_json::from_value::<Vec<Content>>) {
        Some(Ok(contents)) => contents,
        _ => match result {
            Value::String(text) => vec![Content::text(text)],
            Value::Null => Vec::new(),
            other => vec![Content::text(other.to_string())],
        },
    };

    if is_error {
        let text = contents
            .iter()
            .filter_map(Content::as_text)
            .collect::<Vec<_>>()
            .join("\n");
        return Err(AgentError::ExecutionError(text));
    }
    Ok(contents)
}

/// Read the browser's tool record, `{ name: { description?, parameters } }`.
///
/// An absent or null record means no frontend tools.
pub fn frontend_tools(tools: Option<&Value>) -> Result<Vec<Tool>, InvalidToolError> {
    let record = match tools {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Object(record)) => record,
        Some(_) => return Err(InvalidToolError::new("tools", "expected an object keyed by tool name")),
    };

    record
        .iter()
        .map(|(name, definition)| {
            let definition = definition
                .as_object()
                .ok_or_else(|| InvalidToolError::new(name, "definition must be an object"))?;

            let description = match definition.get("description") {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(description)) => description.clone(),
                Some(_) => return Err(InvalidToolError::new(name, "description must be a string")),
            };

            let parameters = match definition.get("parameters") {
                None | Some(Value::Null) => json!({"type": "object", "properties": {}}),
                Some(parameters @ Value::Object(_)) => parameters.clone(),
                Some(_) => return Err(InvalidToolError::new(name, "parameters must be a JSON schema object")),
            };

            Ok(Tool::new(name.clone(), description, parameters))
        })
        .collect()
}
