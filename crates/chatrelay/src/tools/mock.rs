use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;

use super::connection::{ToolConnection, ToolConnector, ToolServerEndpoint};
use crate::errors::AgentResult;
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};

enum ListBehavior {
    Tools(Vec<Tool>),
    Fail(String),
    Hang,
}

enum CloseBehavior {
    Succeed,
    Fail,
    Hang,
}

/// A scripted tool server session
pub struct MockConnection {
    name: String,
    list: ListBehavior,
    close: CloseBehavior,
    results: HashMap<String, AgentResult<Vec<Content>>>,
    hang_calls: bool,
    calls: Mutex<Vec<ToolCall>>,
    closes: AtomicUsize,
}

impl MockConnection {
    pub fn new(name: &str, tools: Vec<Tool>) -> Self {
        Self {
            name: name.to_string(),
            list: ListBehavior::Tools(tools),
            close: CloseBehavior::Succeed,
            results: HashMap::new(),
            hang_calls: false,
            calls: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
        }
    }

    pub fn failing_list(mut self, message: &str) -> Self {
        self.list = ListBehavior::Fail(message.to_string());
        self
    }

    pub fn hanging_list(mut self) -> Self {
        self.list = ListBehavior::Hang;
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.close = CloseBehavior::Fail;
        self
    }

    pub fn hanging_close(mut self) -> Self {
        self.close = CloseBehavior::Hang;
        self
    }

    /// Tool calls are recorded and then never answered
    pub fn hanging_call(mut self) -> Self {
        self.hang_calls = true;
        self
    }

    pub fn with_result(mut self, tool: &str, result: AgentResult<Vec<Content>>) -> Self {
        self.results.insert(tool.to_string(), result);
        self
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<ToolCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolConnection for MockConnection {
    fn server_name(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> anyhow::Result<Vec<Tool>> {
        match &self.list {
            ListBehavior::Tools(tools) => Ok(tools.clone()),
            ListBehavior::Fail(message) => Err(anyhow!(message.clone())),
            ListBehavior::Hang => futures::future::pending().await,
        }
    }

    async fn call_tool(&self, call: ToolCall) -> AgentResult<Vec<Content>> {
        let result = self
            .results
            .get(&call.name)
            .cloned()
            .unwrap_or_else(|| Ok(vec![Content::text(format!("{} done", call.name))]));
        self.calls.lock().unwrap().push(call);
        if self.hang_calls {
            return futures::future::pending().await;
        }
        result
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        match self.close {
            CloseBehavior::Succeed => Ok(()),
            CloseBehavior::Fail => Err(anyhow!("close refused")),
            CloseBehavior::Hang => futures::future::pending().await,
        }
    }
}

enum ConnectBehavior {
    Connect(Arc<MockConnection>),
    Fail(String),
    Hang,
}

/// Hands out scripted connections by endpoint name
#[derive(Default)]
pub struct MockConnector {
    servers: HashMap<String, ConnectBehavior>,
    attempts: Mutex<Vec<String>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connection(mut self, connection: Arc<MockConnection>) -> Self {
        self.servers.insert(
            connection.name.clone(),
            ConnectBehavior::Connect(connection),
        );
        self
    }

    pub fn with_failure(mut self, name: &str, message: &str) -> Self {
        self.servers
            .insert(name.to_string(), ConnectBehavior::Fail(message.to_string()));
        self
    }

    pub fn with_hang(mut self, name: &str) -> Self {
        self.servers.insert(name.to_string(), ConnectBehavior::Hang);
        self
    }

    /// Endpoint names in the order they were connected to
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolConnector for MockConnector {
    async fn connect(
        &self,
        endpoint: &ToolServerEndpoint,
    ) -> anyhow::Result<Arc<dyn ToolConnection>> {
        self.attempts.lock().unwrap().push(endpoint.name.clone());
        match self.servers.get(&endpoint.name) {
            Some(ConnectBehavior::Connect(connection)) => {
                Ok(connection.clone() as Arc<dyn ToolConnection>)
            }
            Some(ConnectBehavior::Fail(message)) => Err(anyhow!(message.clone())),
            Some(ConnectBehavior::Hang) => futures::future::pending().await,
            None => Err(anyhow!("connection refused: {}", endpoint.url)),
        }
    }
}
