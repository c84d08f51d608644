use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{BoxStream, StreamExt};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::message::Message;
use crate::models::tool::ToolCall;
use crate::providers::base::{FinishReason, Provider, ProviderEvent, Usage};
use crate::providers::errors::ProviderError;
use crate::tools::{ToolConnections, ToolManifest, ToolSource};

/// Lifecycle of one chat request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyState {
    Received,
    Gathering,
    Streaming,
    Completed,
    StreamFailed,
    Failed,
}

impl ReplyState {
    /// Log the transition into this state
    pub fn enter(self) -> Self {
        debug!(state = %self, "reply state changed");
        self
    }
}

impl fmt::Display for ReplyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReplyState::Received => "received",
            ReplyState::Gathering => "gathering",
            ReplyState::Streaming => "streaming",
            ReplyState::Completed => "completed",
            ReplyState::StreamFailed => "stream-failed",
            ReplyState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What the agent streams back while answering
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyEvent {
    Text(String),
    ToolCallStart {
        id: String,
        name: String,
    },
    ToolCallDelta {
        id: String,
        arguments_delta: String,
    },
    ToolCall {
        id: String,
        name: String,
        arguments: Value,
    },
    /// Output of a tool the relay executed itself
    ToolResult {
        id: String,
        result: Value,
    },
    StepFinish {
        reason: FinishReason,
        usage: Usage,
        is_continued: bool,
    },
    Error(String),
    /// Always the last event
    Finish {
        reason: FinishReason,
        usage: Usage,
    },
}

/// Agent pairs a model with the tools gathered for one request.
///
/// It owns the request's tool connections and releases them however the
/// reply ends.
pub struct Agent {
    provider: Arc<dyn Provider>,
    tools: ToolManifest,
    connections: ToolConnections,
    max_steps: usize,
    call_timeout: Duration,
}

impl Agent {
    pub fn new(provider: Arc<dyn Provider>, tools: ToolManifest, connections: ToolConnections) -> Self {
        Self {
            provider,
            tools,
            connections,
            max_steps: 1,
            call_timeout: Duration::from_secs(30),
        }
    }

    /// How many model calls one reply may make when server tools keep answering
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// A server tool call still running after `call_timeout` becomes an error result
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn tools(&self) -> &ToolManifest {
        &self.tools
    }

    /// Start the reply.
    ///
    /// The first model request is made before this returns, so a model that
    /// cannot be reached is reported as an error (after the tool connections
    /// are released) rather than as a stream that fails immediately.
    pub async fn reply(
        mut self,
        system: String,
        messages: Vec<Message>,
    ) -> Result<BoxStream<'static, ReplyEvent>, ProviderError> {
        let tools = self.tools.tools();
        debug!(
            model = self.provider.model(),
            tools = tools.len(),
            messages = messages.len(),
            "requesting completion"
        );

        let first = match self.provider.stream(&system, &messages, &tools).await {
            Ok(stream) => stream,
            Err(e) => {
                ReplyState::Failed.enter();
                let report = self.connections.release_all().await;
                debug!(closed = report.closed, failed = report.failed, "released tool connections");
                return Err(e);
            }
        };

        let Agent {
            provider,
            tools: manifest,
            connections,
            max_steps,
            call_timeout,
        } = self;

        Ok(Box::pin(async_stream::stream! {
            let mut connections = connections;
            let mut messages = messages;
            let mut next_stream = Some(first);
            let mut total_usage = Usage::default();
            let mut step = 0;

            let final_reason = loop {
                step += 1;
                let mut events = match next_stream.take() {
                    Some(stream) => stream,
                    None => match provider.stream(&system, &messages, &tools).await {
                        Ok(stream) => stream,
                        Err(e) => {
                            ReplyState::StreamFailed.enter();
                            warn!(step, error = %e, "failed to continue the reply");
                            yield ReplyEvent::Error(e.to_string());
                            release(&mut connections).await;
                            yield ReplyEvent::Finish { reason: FinishReason::Error, usage: total_usage };
                            return;
                        }
                    },
                };

                let mut text = String::new();
                let mut calls: Vec<(String, ToolCall)> = Vec::new();
                let mut all_valid = true;
                let mut step_reason = FinishReason::Other;
                let mut step_usage = Usage::default();
                let mut failure = None;

                while let Some(item) = events.next().await {
                    match item {
                        Ok(ProviderEvent::Text(delta)) => {
                            text.push_str(&delta);
                            yield ReplyEvent::Text(delta);
                        }
                        Ok(ProviderEvent::ToolCallStart { id, name }) => {
                            yield ReplyEvent::ToolCallStart { id, name };
                        }
                        Ok(ProviderEvent::ToolCallDelta { id, arguments_delta }) => {
                            yield ReplyEvent::ToolCallDelta { id, arguments_delta };
                        }
                        Ok(ProviderEvent::ToolCall { id, name, arguments: Ok(arguments) }) => {
                            yield ReplyEvent::ToolCall {
                                id: id.clone(),
                                name: name.clone(),
                                arguments: arguments.clone(),
                            };
                            calls.push((id, ToolCall::new(name, arguments)));
                        }
                        Ok(ProviderEvent::ToolCall { id, name, arguments: Err(e) }) => {
                            warn!(%id, tool = %name, error = %e, "model produced unusable tool arguments");
                            all_valid = false;
                            yield ReplyEvent::Error(e.to_string());
                        }
                        Ok(ProviderEvent::Finish { reason, usage }) => {
                            step_reason = reason;
                            step_usage = usage;
                        }
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
                drop(events);

                if let Some(e) = failure {
                    ReplyState::StreamFailed.enter();
                    warn!(step, error = %e, "model stream failed");
                    yield ReplyEvent::Error(e.to_string());
                    release(&mut connections).await;
                    yield ReplyEvent::Finish { reason: FinishReason::Error, usage: total_usage };
                    return;
                }
                total_usage = total_usage.add(&step_usage);

                // Frontend tools are answered by the browser on its next request
                let mut server_calls = Vec::new();
                for (id, call) in &calls {
                    match manifest.get(&call.name).map(|entry| &entry.source) {
                        Some(ToolSource::Frontend) => all_valid = false,
                        Some(ToolSource::Server { server }) => {
                            server_calls.push((id.clone(), call.clone(), Some(server.clone())));
                        }
                        None => server_calls.push((id.clone(), call.clone(), None)),
                    }
                }

                let outputs = futures::future::join_all(server_calls.iter().map(|(_, call, server)| {
                    execute(&connections, server.as_deref(), call.clone(), call_timeout)
                }))
                .await;

                let mut results = Vec::new();
                for ((id, _, _), output) in server_calls.into_iter().zip(outputs) {
                    yield ReplyEvent::ToolResult { id: id.clone(), result: result_value(&output) };
                    results.push((id, output));
                }

                let is_continued = all_valid && !calls.is_empty() && step < max_steps;
                yield ReplyEvent::StepFinish {
                    reason: step_reason,
                    usage: step_usage,
                    is_continued,
                };
                if !is_continued {
                    break step_reason;
                }

                let mut assistant = Message::assistant();
                if !text.is_empty() {
                    assistant = assistant.with_text(text);
                }
                for (id, call) in calls {
                    assistant = assistant.with_tool_request(id, Ok(call));
                }
                let mut tool_results = Message::user();
                for (id, output) in results {
                    tool_results = tool_results.with_tool_response(id, output);
                }
                messages.push(assistant);
                messages.push(tool_results);
                debug!(step, "continuing with tool results");
            };

            ReplyState::Completed.enter();
            release(&mut connections).await;
            yield ReplyEvent::Finish { reason: final_reason, usage: total_usage };
        }))
    }
}

async fn execute(
    connections: &ToolConnections,
    server: Option<&str>,
    call: ToolCall,
    call_timeout: Duration,
) -> AgentResult<Vec<Content>> {
    let server = server.ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;
    let connection = connections.get(server).ok_or_else(|| {
        AgentError::ExecutionError(format!("Tool server '{}' is not connected", server))
    })?;
    debug!(%server, tool = %call.name, "calling server tool");
    let name = call.name.clone();
    match tokio::time::timeout(call_timeout, connection.call_tool(call)).await {
        Ok(output) => output,
        Err(_) => {
            warn!(%server, tool = %name, timeout = ?call_timeout, "server tool call timed out");
            Err(AgentError::ExecutionError(format!(
                "Tool '{}' on server '{}' did not answer within {:?}",
                name, server, call_timeout
            )))
        }
    }
}

async fn release(connections: &mut ToolConnections) {
    let report = connections.release_all().await;
    if report.attempted > 0 {
        debug!(
            closed = report.closed,
            failed = report.failed,
            "released tool connections"
        );
    }
}

/// A tool result in the shape MCP servers return it
fn result_value(output: &AgentResult<Vec<Content>>) -> Value {
    match output {
        Ok(contents) => json!({ "content": contents, "isError": false }),
        Err(e) => json!({ "content": [Content::text(e.to_string())], "isError": true }),
    }
}
