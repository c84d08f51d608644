use std::collections::BTreeMap;

use futures::StreamExt;
use serde_json::Value;

use super::base::{FinishReason, ProviderEvent, ProviderStream, Usage};
use super::errors::ProviderError;
use crate::errors::AgentError;
use crate::sse;

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
    started: bool,
}

/// Turns openai style `chat.completion.chunk` objects into provider events.
///
/// Tool calls arrive as fragments keyed by `index`; they are announced as soon
/// as both id and name are known and completed when the choice finishes.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    calls: BTreeMap<u64, PartialToolCall>,
    finish_reason: Option<FinishReason>,
    usage: Usage,
}

impl ChunkDecoder {
    pub fn decode(&mut self, chunk: &Value) -> Result<Vec<ProviderEvent>, ProviderError> {
        if let Some(error) = chunk.get("error") {
            return Err(ProviderError::Stream(super::errors::error_summary(
                &error_body(error),
            )));
        }

        if let Some(usage) = chunk
            .get("usage")
            .filter(|u| !u.is_null())
            .or_else(|| chunk.pointer("/x_groq/usage"))
        {
            self.usage = parse_usage(usage);
        }

        let mut events = Vec::new();
        let Some(choice) = chunk.pointer("/choices/0") else {
            return Ok(events);
        };

        if let Some(text) = choice.pointer("/delta/content").and_then(Value::as_str) {
            if !text.is_empty() {
                events.push(ProviderEvent::Text(text.to_string()));
            }
        }

        if let Some(tool_calls) = choice.pointer("/delta/tool_calls").and_then(Value::as_array) {
            for fragment in tool_calls {
                self.apply_fragment(fragment, &mut events);
            }
        }

        if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
            self.finish_reason = Some(FinishReason::from_openai(reason));
            self.flush_calls(&mut events);
        }

        Ok(events)
    }

    /// Complete any outstanding tool calls and close the step
    pub fn finish(&mut self) -> Vec<ProviderEvent> {
        let mut events = Vec::new();
        self.flush_calls(&mut events);
        events.push(ProviderEvent::Finish {
            reason: self.finish_reason.unwrap_or(FinishReason::Other),
            usage: self.usage.clone(),
        });
        events
    }

    fn apply_fragment(&mut self, fragment: &Value, events: &mut Vec<ProviderEvent>) {
        let index = fragment.get("index").and_then(Value::as_u64).unwrap_or(0);
        let call = self.calls.entry(index).or_default();

        if let Some(id) = fragment.get("id").and_then(Value::as_str) {
            call.id = Some(id.to_string());
        }
        if let Some(name) = fragment.pointer("/function/name").and_then(Value::as_str) {
            call.name.push_str(name);
        }
        let delta = fragment
            .pointer("/function/arguments")
            .and_then(Value::as_str)
            .unwrap_or_default();
        call.arguments.push_str(delta);

        if call.started {
            if !delta.is_empty() {
                events.push(ProviderEvent::ToolCallDelta {
                    id: call.id.clone().unwrap_or_default(),
                    arguments_delta: delta.to_string(),
                });
            }
            return;
        }

        if let (Some(id), false) = (&call.id, call.name.is_empty()) {
            call.started = true;
            events.push(ProviderEvent::ToolCallStart {
                id: id.clone(),
                name: call.name.clone(),
            });
            if !call.arguments.is_empty() {
                events.push(ProviderEvent::ToolCallDelta {
                    id: id.clone(),
                    arguments_delta: call.arguments.clone(),
                });
            }
        }
    }

    fn flush_calls(&mut self, events: &mut Vec<ProviderEvent>) {
        for (_, call) in std::mem::take(&mut self.calls) {
            let id = call
                .id
                .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
            if !call.started {
                events.push(ProviderEvent::ToolCallStart {
                    id: id.clone(),
                    name: call.name.clone(),
                });
            }
            let arguments = parse_arguments(&call.name, &call.arguments);
            events.push(ProviderEvent::ToolCall {
                id,
                name: call.name,
                arguments,
            });
        }
    }
}

fn parse_arguments(name: &str, raw: &str) -> Result<Value, AgentError> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw).map_err(|e| {
        AgentError::InvalidParameters(format!(
            "Could not interpret tool use parameters for {}: {}",
            name, e
        ))
    })
}

fn parse_usage(usage: &Value) -> Usage {
    let field = |name: &str| usage.get(name).and_then(Value::as_i64).map(|v| v as i32);
    let input_tokens = field("prompt_tokens");
    let output_tokens = field("completion_tokens");
    let total_tokens = field("total_tokens").or_else(|| match (input_tokens, output_tokens) {
        (Some(input), Some(output)) => Some(input + output),
        _ => None,
    });
    Usage::new(input_tokens, output_tokens, total_tokens)
}

fn error_body(error: &Value) -> String {
    serde_json::json!({ "error": error }).to_string()
}

/// Decode a streaming chat completion response body into provider events
pub fn openai_events(response: reqwest::Response) -> ProviderStream {
    Box::pin(async_stream::stream! {
        let mut decoder = ChunkDecoder::default();
        let mut events = sse::decode_stream(response.bytes_stream());

        while let Some(event) = events.next().await {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    yield Err(ProviderError::Http(e));
                    return;
                }
            };

            let data = event.data.trim();
            if data.is_empty() {
                continue;
            }
            if data == "[DONE]" {
                break;
            }

            let chunk: Value = match serde_json::from_str(data) {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(ProviderError::InvalidResponse(format!("{}: {}", e, data)));
                    return;
                }
            };

            match decoder.decode(&chunk) {
                Ok(decoded) => {
                    for item in decoded {
                        yield Ok(item);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }

        for item in decoder.finish() {
            yield Ok(item);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode_all(chunks: Vec<Value>) -> Vec<ProviderEvent> {
        let mut decoder = ChunkDecoder::default();
        let mut events = Vec::new();
        for chunk in chunks {
            events.extend(decoder.decode(&chunk).unwrap());
        }
        events.extend(decoder.finish());
        events
    }

    #[test]
    fn test_text_deltas_and_usage() {
        let events = decode_all(vec![
            json!({"choices": [{"index": 0, "delta": {"role": "assistant", "content": ""}}]}),
            json!({"choices": [{"index": 0, "delta": {"content": "Hel"}}]}),
            json!({"choices": [{"index": 0, "delta": {"content": "lo"}}]}),
            json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}],
                   "x_groq": {"usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}}}),
        ]);

        assert_eq!(
            events,
            vec![
                ProviderEvent::Text("Hel".into()),
                ProviderEvent::Text("lo".into()),
                ProviderEvent::Finish {
                    reason: FinishReason::Stop,
                    usage: Usage::new(Some(12), Some(3), Some(15)),
                },
            ]
        );
    }

    #[test]
    fn test_tool_call_fragments() {
        let events = decode_all(vec![
            json!({"choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "id": "call_1", "type": "function", "function": {"name": "weather", "arguments": ""}}
            ]}}]}),
            json!({"choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "{\"city\":"}}
            ]}}]}),
            json!({"choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "\"Oslo\"}"}}
            ]}}]}),
            json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "tool_calls"}]}),
            json!({"choices": [], "usage": {"prompt_tokens": 5, "completion_tokens": 7}}),
        ]);

        assert_eq!(
            events,
            vec![
                ProviderEvent::ToolCallStart { id: "call_1".into(), name: "weather".into() },
                ProviderEvent::ToolCallDelta { id: "call_1".into(), arguments_delta: "{\"city\":".into() },
                ProviderEvent::ToolCallDelta { id: "call_1".into(), arguments_delta: "\"Oslo\"}".into() },
                ProviderEvent::ToolCall {
                    id: "call_1".into(),
                    name: "weather".into(),
                    arguments: Ok(json!({"city": "Oslo"})),
                },
                ProviderEvent::Finish {
                    reason: FinishReason::ToolCalls,
                    usage: Usage::new(Some(5), Some(7), Some(12)),
                },
            ]
        );
    }

    #[test]
    fn test_complete_tool_call_in_one_chunk() {
        // Groq sends whole tool calls in a single delta
        let events = decode_all(vec![json!({"choices": [{"index": 0, "delta": {"tool_calls": [
            {"index": 0, "id": "a", "function": {"name": "first", "arguments": "{}"}},
            {"index": 1, "id": "b", "function": {"name": "second", "arguments": "{\"x\":1}"}}
        ]}, "finish_reason": "tool_calls"}]})]);

        let calls: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ProviderEvent::ToolCall { id, arguments, .. } => Some((id.clone(), arguments.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(
            calls,
            vec![("a".to_string(), Ok(json!({}))), ("b".to_string(), Ok(json!({"x": 1})))]
        );
        assert!(events.contains(&ProviderEvent::ToolCallDelta {
            id: "b".into(),
            arguments_delta: "{\"x\":1}".into()
        }));
    }

    #[test]
    fn test_invalid_arguments_become_errors() {
        let events = decode_all(vec![json!({"choices": [{"index": 0, "delta": {"tool_calls": [
            {"index": 0, "id": "bad", "function": {"name": "weather", "arguments": "{\"city\":"}}
        ]}, "finish_reason": "tool_calls"}]})]);

        let arguments = events.iter().find_map(|e| match e {
            ProviderEvent::ToolCall { arguments, .. } => Some(arguments.clone()),
            _ => None,
        });
        assert!(matches!(arguments, Some(Err(AgentError::InvalidParameters(_)))));
    }

    #[test]
    fn test_error_chunk() {
        let mut decoder = ChunkDecoder::default();
        let result = decoder.decode(&json!({"error": {"message": "model overloaded"}}));
        match result {
            Err(ProviderError::Stream(message)) => assert_eq!(message, "model overloaded"),
            other => panic!("Expected stream error, got {:?}", other),
        }
    }

    #[test]
    fn test_finish_without_reason() {
        let events = decode_all(vec![json!({"choices": [{"index": 0, "delta": {"content": "cut"}}]})]);
        assert_eq!(
            events.last(),
            Some(&ProviderEvent::Finish { reason: FinishReason::Other, usage: Usage::default() })
        );
    }
}
