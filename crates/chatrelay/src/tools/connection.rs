use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::errors::AgentResult;
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};

/// A configured tool server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolServerEndpoint {
    pub name: String,
    pub url: String,
}

impl ToolServerEndpoint {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// An open session with a tool server
#[async_trait]
pub trait ToolConnection: Send + Sync {
    /// The configured name of the server this connection belongs to
    fn server_name(&self) -> &str;

    async fn list_tools(&self) -> anyhow::Result<Vec<Tool>>;

    /// Run a tool on the server. Failures come back as tool results, not transport errors.
    async fn call_tool(&self, call: ToolCall) -> AgentResult<Vec<Content>>;

    /// Closing an already closed connection must succeed
    async fn close(&self) -> anyhow::Result<()>;
}

/// Opens connections to tool servers
#[async_trait]
pub trait ToolConnector: Send + Sync {
    async fn connect(&self, endpoint: &ToolServerEndpoint)
        -> anyhow::Result<Arc<dyn ToolConnection>>;
}

/// Outcome of closing a set of connections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    pub attempted: usize,
    pub closed: usize,
    pub failed: usize,
}

/// Every connection opened for one request.
///
/// `release_all` drains the set, so only the first call closes anything.
/// A set dropped while still holding connections closes them on a spawned
/// task.
pub struct ToolConnections {
    connections: Vec<Arc<dyn ToolConnection>>,
    close_timeout: Duration,
}

impl ToolConnections {
    pub fn new(close_timeout: Duration) -> Self {
        Self {
            connections: Vec::new(),
            close_timeout,
        }
    }

    pub fn push(&mut self, connection: Arc<dyn ToolConnection>) {
        self.connections.push(connection);
    }

    /// The connection for a server, if it was opened
    pub fn get(&self, server: &str) -> Option<Arc<dyn ToolConnection>> {
        self.connections
            .iter()
            .rev()
            .find(|c| c.server_name() == server)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn server_names(&self) -> Vec<String> {
        self.connections
            .iter()
            .map(|c| c.server_name().to_string())
            .collect()
    }

    pub async fn release_all(&mut self) -> ReleaseReport {
        let connections = std::mem::take(&mut self.connections);
        close_all(connections, self.close_timeout).await
    }
}

impl Drop for ToolConnections {
    fn drop(&mut self) {
        if self.connections.is_empty() {
            return;
        }
        let connections = std::mem::take(&mut self.connections);
        let close_timeout = self.close_timeout;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(count = connections.len(), "releasing tool connections on drop");
                handle.spawn(async move {
                    close_all(connections, close_timeout).await;
                });
            }
            Err(_) => {
                warn!(
                    count = connections.len(),
                    "no runtime to release tool connections on drop"
                );
            }
        }
    }
}

async fn close_all(connections: Vec<Arc<dyn ToolConnection>>, close_timeout: Duration) -> ReleaseReport {
    let attempted = connections.len();
    let outcomes = join_all(connections.iter().map(|connection| async move {
        let server = connection.server_name();
        match tokio::time::timeout(close_timeout, connection.close()).await {
            Ok(Ok(())) => {
                debug!(%server, "closed tool server connection");
                true
            }
            Ok(Err(e)) => {
                warn!(%server, error = %e, "failed to close tool server connection");
                false
            }
            Err(_) => {
                warn!(%server, timeout = ?close_timeout, "timed out closing tool server connection");
                false
            }
        }
    }))
    .await;

    let closed = outcomes.iter().filter(|closed| **closed).count();
    ReleaseReport {
        attempted,
        closed,
        failed: attempted - closed,
    }
}
