use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::ProviderError;
use crate::errors::AgentResult;
use crate::models::message::Message;
use crate::models::tool::Tool;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }

    /// Sum two usages, treating a missing count on both sides as unknown
    pub fn add(&self, other: &Usage) -> Usage {
        fn sum(a: Option<i32>, b: Option<i32>) -> Option<i32> {
            match (a, b) {
                (None, None) => None,
                (a, b) => Some(a.unwrap_or(0) + b.unwrap_or(0)),
            }
        }
        Usage::new(
            sum(self.input_tokens, other.input_tokens),
            sum(self.output_tokens, other.output_tokens),
            sum(self.total_tokens, other.total_tokens),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Error,
    Other,
}

impl FinishReason {
    /// Map an openai style `finish_reason`
    pub fn from_openai(reason: &str) -> Self {
        match reason {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            "tool_calls" | "function_call" => FinishReason::ToolCalls,
            "content_filter" => FinishReason::ContentFilter,
            _ => FinishReason::Other,
        }
    }

    /// The name used by the AI SDK data stream protocol
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ToolCalls => "tool-calls",
            FinishReason::ContentFilter => "content-filter",
            FinishReason::Error => "error",
            FinishReason::Other => "other",
        }
    }
}

/// Incremental output of a streaming completion
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// A fragment of assistant text
    Text(String),
    /// The model started a tool call
    ToolCallStart { id: String, name: String },
    /// A fragment of a tool call's JSON arguments
    ToolCallDelta { id: String, arguments_delta: String },
    /// A tool call is complete; arguments fail to parse as an error
    ToolCall {
        id: String,
        name: String,
        arguments: AgentResult<Value>,
    },
    /// The step ended
    Finish { reason: FinishReason, usage: Usage },
}

pub type ProviderStream = BoxStream<'static, Result<ProviderEvent, ProviderError>>;

/// Base trait for AI providers (Groq, OpenAI, etc)
#[async_trait]
pub trait Provider: Send + Sync {
    /// The model this provider sends requests to
    fn model(&self) -> &str;

    /// Start a streaming completion.
    ///
    /// Any failure to reach the model (transport error, non-success status) is
    /// returned here, before a single event is produced.
    async fn stream(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<ProviderStream, ProviderError>;
}
