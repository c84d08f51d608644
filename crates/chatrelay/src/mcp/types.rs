//! MCP schema types as the relay uses them, and conversions into its own models.
use rust_mcp_schema::{
    CallToolResult, ClientCapabilities, ContentBlock, Implementation, InitializeRequestParams,
};
use serde_json::{json, Value};

use crate::models::content::Content;
use crate::models::tool::Tool;

pub use rust_mcp_schema::{InitializeResult, ListToolsResult, Tool as McpTool};

/// Revision of the HTTP + SSE transport this client speaks
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub(crate) const JSONRPC_VERSION: &str = "2.0";

pub fn client_details() -> InitializeRequestParams {
    InitializeRequestParams {
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: "chatrelay".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: None,
            description: None,
            icons: Vec::new(),
            website_url: None,
        },
        meta: None,
        protocol_version: PROTOCOL_VERSION.to_string(),
    }
}

impl From<McpTool> for Tool {
    fn from(tool: McpTool) -> Self {
        let input_schema = serde_json::to_value(&tool.input_schema)
            .unwrap_or_else(|_| json!({ "type": "object", "properties": {} }));
        Tool::new(tool.name, tool.description.unwrap_or_default(), input_schema)
    }
}

impl From<ContentBlock> for Content {
    fn from(block: ContentBlock) -> Self {
        match block {
            ContentBlock::TextContent(text) => Content::text(text.text),
            ContentBlock::ImageContent(image) => Content::image(image.data, image.mime_type),
            other => Content::text(
                serde_json::to_string(&other).unwrap_or_else(|_| "[unsupported content]".to_string()),
            ),
        }
    }
}

pub fn is_error(result: &CallToolResult) -> bool {
    result.is_error.unwrap_or(false)
}

pub fn into_contents(result: CallToolResult) -> Vec<Content> {
    result.content.into_iter().map(Content::from).collect()
}

/// Arguments as the `tools/call` request carries them; anything but an object becomes `{}`
pub fn call_arguments(arguments: Value) -> serde_json::Map<String, Value> {
    match arguments {
        Value::Object(arguments) => arguments,
        _ => serde_json::Map::new(),
    }
}
