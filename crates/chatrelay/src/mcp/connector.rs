use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;

use super::client::McpClient;
use super::types;
use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};
use crate::providers::utils::tool_result_text;
use crate::tools::{ToolConnection, ToolConnector, ToolServerEndpoint};

/// Opens MCP sessions over HTTP + SSE
#[derive(Debug, Clone, Default)]
pub struct SseConnector {
    http: reqwest::Client,
}

impl SseConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ToolConnector for SseConnector {
    async fn connect(&self, endpoint: &ToolServerEndpoint) -> anyhow::Result<Arc<dyn ToolConnection>> {
        let client = McpClient::connect_sse(&endpoint.name, &endpoint.url, self.http.clone())
            .await
            .with_context(|| format!("Failed to connect to tool server at {}", endpoint.url))?;
        Ok(Arc::new(client))
    }
}

#[async_trait]
impl ToolConnection for McpClient {
    fn server_name(&self) -> &str {
        self.name()
    }

    async fn list_tools(&self) -> anyhow::Result<Vec<Tool>> {
        let tools = McpClient::list_tools(self).await?;
        Ok(tools.into_iter().map(Tool::from).collect())
    }

    async fn call_tool(&self, call: ToolCall) -> AgentResult<Vec<Content>> {
        let result = McpClient::call_tool(self, &call.name, call.arguments)
            .await
            .map_err(|e| AgentError::ExecutionError(e.to_string()))?;

        let failed = types::is_error(&result);
        let contents = types::into_contents(result);
        if failed {
            return Err(AgentError::ExecutionError(tool_result_text(&contents)));
        }
        Ok(contents)
    }

    async fn close(&self) -> anyhow::Result<()> {
        McpClient::close(self).await?;
        Ok(())
    }
}
