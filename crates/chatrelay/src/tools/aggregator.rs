use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::connection::{ToolConnections, ToolConnector, ToolServerEndpoint};
use super::manifest::ToolManifest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorTimeouts {
    pub connect: Duration,
    pub list: Duration,
    pub close: Duration,
    /// Upper bound on one server tool call
    pub call: Duration,
}

impl Default for AggregatorTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            list: Duration::from_secs(10),
            close: Duration::from_secs(5),
            call: Duration::from_secs(30),
        }
    }
}

/// What one `gather` produced: the connections to release later and the tools they offer
pub struct Gathered {
    pub connections: ToolConnections,
    pub tools: ToolManifest,
}

/// Collects tools from every configured tool server for a single request
pub struct ToolAggregator {
    connector: Arc<dyn ToolConnector>,
    timeouts: AggregatorTimeouts,
}

impl ToolAggregator {
    pub fn new(connector: Arc<dyn ToolConnector>, timeouts: AggregatorTimeouts) -> Self {
        Self {
            connector,
            timeouts,
        }
    }

    pub fn timeouts(&self) -> AggregatorTimeouts {
        self.timeouts
    }

    /// Connect to each endpoint in order and list its tools.
    ///
    /// A server that cannot be reached or listed contributes nothing; this
    /// never fails. Connections are recorded as soon as they open, so one
    /// whose listing timed out is still released with the rest.
    pub async fn gather(&self, endpoints: &[ToolServerEndpoint]) -> Gathered {
        let mut connections = ToolConnections::new(self.timeouts.close);
        let mut tools = ToolManifest::new();

        for endpoint in endpoints {
            debug!(server = %endpoint.name, url = %endpoint.url, "connecting to tool server");

            let connection = match timeout(self.timeouts.connect, self.connector.connect(endpoint)).await {
                Ok(Ok(connection)) => connection,
                Ok(Err(e)) => {
                    error!(server = %endpoint.name, error = %e, "failed to connect to tool server");
                    continue;
                }
                Err(_) => {
                    error!(
                        server = %endpoint.name,
                        timeout = ?self.timeouts.connect,
                        "timed out connecting to tool server"
                    );
                    continue;
                }
            };
            connections.push(connection.clone());

            match timeout(self.timeouts.list, connection.list_tools()).await {
                Ok(Ok(listed)) => {
                    info!(server = %endpoint.name, count = listed.len(), "loaded tools");
                    tools.extend_from_server(&endpoint.name, listed);
                }
                Ok(Err(e)) => {
                    warn!(server = %endpoint.name, error = %e, "failed to list tools");
                }
                Err(_) => {
                    warn!(
                        server = %endpoint.name,
                        timeout = ?self.timeouts.list,
                        "timed out listing tools"
                    );
                }
            }
        }

        Gathered { connections, tools }
    }
}
