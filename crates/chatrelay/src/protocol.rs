//! Encoding for the AI SDK data stream protocol (`x-vercel-ai-data-stream: v1`).
//!
//! Every frame is one line: a type code, a colon and a JSON value.
use serde_json::{json, Value};

use crate::agent::ReplyEvent;
use crate::providers::base::{FinishReason, Usage};

pub const DATA_STREAM_HEADER: &str = "x-vercel-ai-data-stream";
pub const DATA_STREAM_VERSION: &str = "v1";

pub struct ProtocolFormatter;

impl ProtocolFormatter {
    pub fn format_text(text: &str) -> String {
        format!("0:{}\n", json!(text))
    }

    pub fn format_tool_call_start(id: &str, name: &str) -> String {
        let start = json!({
            "toolCallId": id,
            "toolName": name,
        });
        format!("b:{}\n", start)
    }

    pub fn format_tool_call_delta(id: &str, delta: &str) -> String {
        let delta = json!({
            "toolCallId": id,
            "argsTextDelta": delta,
        });
        format!("c:{}\n", delta)
    }

    pub fn format_tool_call(id: &str, name: &str, args: &Value) -> String {
        let tool_call = json!({
            "toolCallId": id,
            "toolName": name,
            "args": args
        });
        format!("9:{}\n", tool_call)
    }

    pub fn format_tool_result(id: &str, result: &Value) -> String {
        let response = json!({
            "toolCallId": id,
            "result": result,
        });
        format!("a:{}\n", response)
    }

    pub fn format_error(message: &str) -> String {
        format!("3:{}\n", json!(message))
    }

    pub fn format_finish_step(reason: FinishReason, usage: &Usage, is_continued: bool) -> String {
        let finish = json!({
            "finishReason": reason.as_str(),
            "usage": usage_value(usage),
            "isContinued": is_continued,
        });
        format!("e:{}\n", finish)
    }

    pub fn format_finish(reason: FinishReason, usage: &Usage) -> String {
        let finish = json!({
            "finishReason": reason.as_str(),
            "usage": usage_value(usage),
        });
        format!("d:{}\n", finish)
    }

    pub fn format_event(event: &ReplyEvent) -> String {
        match event {
            ReplyEvent::Text(text) => Self::format_text(text),
            ReplyEvent::ToolCallStart { id, name } => Self::format_tool_call_start(id, name),
            ReplyEvent::ToolCallDelta {
                id,
                arguments_delta,
            } => Self::format_tool_call_delta(id, arguments_delta),
            ReplyEvent::ToolCall {
                id,
                name,
                arguments,
            } => Self::format_tool_call(id, name, arguments),
            ReplyEvent::ToolResult { id, result } => Self::format_tool_result(id, result),
            ReplyEvent::StepFinish {
                reason,
                usage,
                is_continued,
            } => Self::format_finish_step(*reason, usage, *is_continued),
            ReplyEvent::Error(message) => Self::format_error(message),
            ReplyEvent::Finish { reason, usage } => Self::format_finish(*reason, usage),
        }
    }
}

fn usage_value(usage: &Usage) -> Value {
    json!({
        "promptTokens": usage.input_tokens.unwrap_or(0),
        "completionTokens": usage.output_tokens.unwrap_or(0),
    })
}
