//! An in-process MCP server speaking the HTTP + SSE transport.
#![allow(dead_code)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// How the test server answers
#[derive(Debug, Clone, Default)]
pub struct ServerBehavior {
    /// `tools/list` pages, linked with numeric cursors
    pub tool_pages: Vec<Vec<Value>>,
    /// Never answer `tools/list`
    pub hang_on_list: bool,
    /// Send a `ping` request right after answering `initialize`
    pub ping_after_initialize: bool,
}

pub struct ServerState {
    behavior: ServerBehavior,
    sessions: Mutex<HashMap<String, mpsc::UnboundedSender<Event>>>,
    received: Mutex<Vec<Value>>,
}

pub struct McpTestServer {
    pub sse_url: String,
    state: Arc<ServerState>,
    task: JoinHandle<()>,
}

impl McpTestServer {
    pub async fn start(behavior: ServerBehavior) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(ServerState {
            behavior,
            sessions: Mutex::new(HashMap::new()),
            received: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/sse", get(open_session))
            .route("/message", post(receive_message))
            .with_state(state.clone());
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            sse_url: format!("http://{}/sse", addr),
            state,
            task,
        }
    }

    pub fn with_tools(tools: Vec<Value>) -> ServerBehavior {
        ServerBehavior {
            tool_pages: vec![tools],
            ..Default::default()
        }
    }

    /// Every JSON-RPC message the client posted, in order
    pub fn received(&self) -> Vec<Value> {
        self.state.received.lock().unwrap().clone()
    }

    pub fn received_methods(&self) -> Vec<String> {
        self.received()
            .iter()
            .filter_map(|m| m["method"].as_str().map(str::to_owned))
            .collect()
    }

    /// Event streams the client still holds open
    pub fn open_sessions(&self) -> usize {
        self.state
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|tx| !tx.is_closed())
            .count()
    }

    /// End every open event stream, as a server shutting down would
    pub fn end_sessions(&self) {
        self.state.sessions.lock().unwrap().clear();
    }

    /// Poll until `check` holds, giving up after a second
    pub async fn wait_for(&self, check: impl Fn(&Self) -> bool) -> bool {
        for _ in 0..100 {
            if check(self) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        check(self)
    }
}

impl Drop for McpTestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub fn tool(name: &str, description: &str) -> Value {
    json!({
        "name": name,
        "description": description,
        "inputSchema": {
            "type": "object",
            "properties": {"message": {"type": "string"}}
        }
    })
}

fn message_event(message: &Value) -> Event {
    Event::default().event("message").data(message.to_string())
}

async fn open_session(
    State(state): State<Arc<ServerState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session = uuid::Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::unbounded_channel();
    let _ = tx.send(
        Event::default()
            .event("endpoint")
            .data(format!("/message?sessionId={}", session)),
    );
    state.sessions.lock().unwrap().insert(session, tx);

    // Frequent keep-alives make a dropped client show up quickly as a closed session
    Sse::new(UnboundedReceiverStream::new(rx).map(Ok))
        .keep_alive(KeepAlive::new().interval(Duration::from_millis(50)))
}

async fn receive_message(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> StatusCode {
    state.received.lock().unwrap().push(body.clone());

    let session = query.get("sessionId").cloned().unwrap_or_default();
    let tx = state.sessions.lock().unwrap().get(&session).cloned();
    let Some(tx) = tx else {
        return StatusCode::NOT_FOUND;
    };

    if let (Some(method), Some(id)) = (body["method"].as_str(), body.get("id")) {
        if let Some(response) = state.respond(method, &body["params"], id.clone()) {
            let _ = tx.send(message_event(&response));
        }
        if method == "initialize" && state.behavior.ping_after_initialize {
            let _ = tx.send(message_event(
                &json!({"jsonrpc": "2.0", "id": "srv-ping", "method": "ping"}),
            ));
        }
    }

    StatusCode::ACCEPTED
}

impl ServerState {
    fn respond(&self, method: &str, params: &Value, id: Value) -> Option<Value> {
        let result = match method {
            "initialize" => json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "test-server", "version": "0.1.0"}
            }),
            "tools/list" => {
                if self.behavior.hang_on_list {
                    return None;
                }
                let page = params["cursor"]
                    .as_str()
                    .and_then(|c| c.parse::<usize>().ok())
                    .unwrap_or(0);
                let tools = self.behavior.tool_pages.get(page).cloned().unwrap_or_default();
                let mut result = json!({ "tools": tools });
                if page + 1 < self.behavior.tool_pages.len() {
                    result["nextCursor"] = json!((page + 1).to_string());
                }
                result
            }
            "tools/call" => match params["name"].as_str() {
                Some("echo") => json!({
                    "content": [{"type": "text", "text": params["arguments"]["message"]}]
                }),
                Some("fail") => json!({
                    "content": [{"type": "text", "text": "it broke"}],
                    "isError": true
                }),
                _ => {
                    return Some(json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": {"code": -32602, "message": "Unknown tool"}
                    }))
                }
            },
            _ => {
                return Some(json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {"code": -32601, "message": "Method not found"}
                }))
            }
        };
        Some(json!({"jsonrpc": "2.0", "id": id, "result": result}))
    }
}
