use std::sync::atomic::{AtomicBool, Ordering};

use rust_mcp_schema::schema_utils::{NotificationFromClient, RequestFromClient};
use rust_mcp_schema::{
    CallToolRequestParams, CallToolResult, Implementation, InitializeResult, ListToolsResult,
    PaginatedRequestParams,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use super::errors::{McpError, McpResult};
use super::transport::SseTransport;
use super::types::{call_arguments, client_details, McpTool};

/// An initialized session with one tool server
pub struct McpClient {
    name: String,
    transport: SseTransport,
    server_info: Implementation,
    instructions: Option<String>,
    closed: AtomicBool,
}

impl McpClient {
    /// Open the event stream, then run the `initialize` handshake
    pub async fn connect_sse(
        name: impl Into<String>,
        url: &str,
        http: reqwest::Client,
    ) -> McpResult<Self> {
        let name = name.into();
        let url = Url::parse(url)?;
        let transport = SseTransport::connect(http, url).await?;

        let result = transport
            .request(RequestFromClient::InitializeRequest(client_details()))
            .await
            .map_err(|e| McpError::InitializationFailed(e.to_string()))?;
        let init: InitializeResult = serde_json::from_value(result)
            .map_err(|e| McpError::InitializationFailed(e.to_string()))?;
        if init.protocol_version.trim().is_empty() {
            return Err(McpError::InitializationFailed(
                "server did not name a protocol version".to_string(),
            ));
        }

        transport
            .notify(NotificationFromClient::InitializedNotification(None))
            .await?;

        info!(
            server = %name,
            server_name = %init.server_info.name,
            protocol_version = %init.protocol_version,
            "connected to tool server"
        );

        Ok(Self {
            name,
            transport,
            server_info: init.server_info,
            instructions: init.instructions,
            closed: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn server_info(&self) -> &Implementation {
        &self.server_info
    }

    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    /// Every tool the server offers, following `nextCursor` pages
    pub async fn list_tools(&self) -> McpResult<Vec<McpTool>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = cursor.clone().map(|cursor| PaginatedRequestParams {
                cursor: Some(cursor),
                meta: None,
            });
            let page: ListToolsResult = self
                .request(RequestFromClient::ListToolsRequest(params))
                .await?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() && cursor.as_deref() != Some(next.as_str()) => {
                    cursor = Some(next);
                }
                _ => break,
            }
        }

        debug!(server = %self.name, count = tools.len(), "listed tools");
        Ok(tools)
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<CallToolResult> {
        let params = CallToolRequestParams::new(name).with_arguments(call_arguments(arguments));
        self.request(RequestFromClient::CallToolRequest(params)).await
    }

    /// Closing twice is a no-op
    pub async fn close(&self) -> McpResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.transport.close().await;
        debug!(server = %self.name, "closed tool server connection");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn request<T: DeserializeOwned>(&self, request: RequestFromClient) -> McpResult<T> {
        if self.is_closed() {
            return Err(McpError::ConnectionClosed);
        }
        let result = self.transport.request(request).await?;
        Ok(serde_json::from_value(result)?)
    }
}
