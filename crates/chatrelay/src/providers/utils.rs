use serde_json::{json, Map, Value};

use super::errors::ProviderError;
use crate::models::content::Content;
use crate::models::message::{Message, MessageContent};
use crate::models::tool::Tool;

/// Convert internal Message format to the openai chat completion message specification
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    let mut messages_spec = Vec::new();

    for message in messages {
        let mut converted = json!({
            "role": message.role
        });
        let mut text = String::new();
        let mut output = Vec::new();

        for content in &message.content {
            match content {
                MessageContent::Text(part) => text.push_str(part),
                MessageContent::ToolRequest(request) => match &request.tool_call {
                    Ok(tool_call) => {
                        let entry = json!({
                            "id": request.id,
                            "type": "function",
                            "function": {
                                "name": tool_call.name,
                                "arguments": tool_call.arguments.to_string(),
                            }
                        });
                        match converted.get_mut("tool_calls").and_then(Value::as_array_mut) {
                            Some(tool_calls) => tool_calls.push(entry),
                            None => converted["tool_calls"] = json!([entry]),
                        }
                    }
                    Err(e) => {
                        output.push(json!({
                            "role": "tool",
                            "content": format!("Error: {}", e),
                            "tool_call_id": request.id
                        }));
                    }
                },
                MessageContent::ToolResponse(response) => {
                    let content = match &response.tool_result {
                        Ok(contents) => tool_result_text(contents),
                        // A tool result error is shown as output so the model can interpret the error message
                        Err(e) => format!("The tool call returned the following error:\n{}", e),
                    };
                    output.push(json!({
                        "role": "tool",
                        "content": content,
                        "tool_call_id": response.id
                    }));
                }
            }
        }

        if !text.is_empty() {
            converted["content"] = json!(text);
        }
        if converted.get("content").is_some() || converted.get("tool_calls").is_some() {
            output.insert(0, converted);
        }
        messages_spec.extend(output);
    }

    messages_spec
}

/// Flatten tool result content into the plain text the chat API accepts for `tool` messages
pub fn tool_result_text(contents: &[Content]) -> String {
    contents
        .iter()
        .map(|content| match content {
            Content::Text(text) => text.text.clone(),
            Content::Image(image) => format!("[image result: {}]", image.mime_type),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Convert internal Tool format to the openai tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>, ProviderError> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(ProviderError::InvalidRequest(format!(
                "Duplicate tool name: {}",
                tool.name
            )));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema,
            }
        }));
    }

    Ok(result)
}

/// Options shared by every openai compatible request
pub struct RequestOptions<'a> {
    pub model: &'a str,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
    /// Ask for a trailing usage chunk (`stream_options.include_usage`)
    pub include_usage: bool,
}

/// Build the payload for a streaming chat completion
pub fn create_request(
    options: &RequestOptions<'_>,
    system: &str,
    messages: &[Message],
    tools: &[Tool],
) -> Result<Value, ProviderError> {
    let mut messages_array = Vec::new();
    if !system.is_empty() {
        messages_array.push(json!({
            "role": "system",
            "content": system
        }));
    }
    messages_array.extend(messages_to_openai_spec(messages));

    let mut payload = Map::new();
    payload.insert("model".to_string(), json!(options.model));
    payload.insert("messages".to_string(), json!(messages_array));
    payload.insert("stream".to_string(), json!(true));

    let tools_spec = tools_to_openai_spec(tools)?;
    if !tools_spec.is_empty() {
        payload.insert("tools".to_string(), json!(tools_spec));
    }
    if options.include_usage {
        payload.insert(
            "stream_options".to_string(),
            json!({ "include_usage": true }),
        );
    }
    if let Some(temp) = options.temperature {
        payload.insert("temperature".to_string(), json!(temp));
    }
    if let Some(tokens) = options.max_tokens {
        payload.insert("max_tokens".to_string(), json!(tokens));
    }

    Ok(Value::Object(payload))
}
