use std::sync::Arc;

use anyhow::Context;
use chatrelay::mcp::SseConnector;
use chatrelay::providers::{base::Provider, factory};
use chatrelay::tools::{ToolAggregator, ToolServerEndpoint};

use crate::configuration::Settings;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn Provider>,
    pub aggregator: Arc<ToolAggregator>,
    pub tool_servers: Arc<Vec<ToolServerEndpoint>>,
    pub max_steps: usize,
}

impl AppState {
    pub fn new(
        provider: Arc<dyn Provider>,
        aggregator: Arc<ToolAggregator>,
        tool_servers: Vec<ToolServerEndpoint>,
        max_steps: usize,
    ) -> Self {
        Self {
            provider,
            aggregator,
            tool_servers: Arc::new(tool_servers),
            max_steps,
        }
    }

    pub fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        let tool_servers = settings.tools.endpoints();
        let aggregator = ToolAggregator::new(Arc::new(SseConnector::new()), settings.tools.timeouts());
        let provider = factory::get_provider(settings.provider.into_config())
            .context("failed to create the model provider")?;

        Ok(Self::new(
            provider,
            Arc::new(aggregator),
            tool_servers,
            settings.tools.max_steps,
        ))
    }
}
