use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt};
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use reqwest::Client;
use rust_mcp_schema::schema_utils::{
    ClientMessage, FromMessage, MessageFromClient, NotificationFromClient, RequestFromClient,
    ServerMessage,
};
use rust_mcp_schema::{RequestId, RpcError};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use super::errors::{McpError, McpResult};
use super::types::JSONRPC_VERSION;
use crate::sse::{self, SseEvent};

type EventStream = BoxStream<'static, Result<SseEvent, reqwest::Error>>;

/// Requests waiting for a response, and whether the event stream can still deliver one.
///
/// Both live behind one lock so a request is never registered after the
/// reader has given up.
#[derive(Default)]
struct Pending {
    closed: bool,
    waiting: HashMap<RequestId, oneshot::Sender<ServerMessage>>,
}

impl Pending {
    fn shut(&mut self) {
        self.closed = true;
        // Dropping the senders wakes every waiting request
        self.waiting.clear();
    }
}

type SharedPending = Arc<Mutex<Pending>>;

/// The legacy MCP HTTP + SSE transport.
///
/// A background task reads the event stream and routes responses to waiting
/// requests by id. Dropping the transport aborts that task, which closes the
/// stream.
pub struct SseTransport {
    client: Client,
    message_url: Url,
    next_id: AtomicI64,
    pending: SharedPending,
    reader: JoinHandle<()>,
}

impl SseTransport {
    /// Open the event stream and wait for the server to announce where to post messages
    pub async fn connect(client: Client, url: Url) -> McpResult<Self> {
        let response = client
            .get(url.clone())
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .header(CONNECTION, "keep-alive")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(McpError::ConnectionFailed(format!(
                "{} answered HTTP {}",
                url, status
            )));
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !content_type.starts_with("text/event-stream") {
            return Err(McpError::ConnectionFailed(format!(
                "expected an event stream, got content type '{}'",
                content_type
            )));
        }

        let mut events: EventStream = sse::decode_stream(response.bytes_stream());
        let message_url = loop {
            match events.next().await {
                Some(Ok(event)) if event.kind() == "endpoint" => {
                    break url.join(event.data.trim())?;
                }
                Some(Ok(event)) => {
                    debug!(kind = event.kind(), "ignoring event before endpoint");
                }
                Some(Err(e)) => return Err(McpError::Http(e)),
                None => {
                    return Err(McpError::ConnectionFailed(
                        "event stream ended before the endpoint was announced".to_string(),
                    ))
                }
            }
        };

        if message_url.origin() != url.origin() {
            return Err(McpError::ConnectionFailed(format!(
                "endpoint origin does not match connection origin: {}",
                message_url
            )));
        }
        debug!(%message_url, "tool server announced message endpoint");

        let pending = SharedPending::default();
        let reader = tokio::spawn(read_messages(
            events,
            pending.clone(),
            client.clone(),
            message_url.clone(),
        ));

        Ok(Self {
            client,
            message_url,
            next_id: AtomicI64::new(0),
            pending,
            reader,
        })
    }

    pub fn message_url(&self) -> &Url {
        &self.message_url
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::Integer(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Send a request and wait for the matching response on the event stream.
    ///
    /// Returns the raw `result` of a successful response.
    pub async fn request(&self, request: RequestFromClient) -> McpResult<Value> {
        let request_id = self.next_request_id();
        let message = ClientMessage::from_message(
            MessageFromClient::RequestFromClient(request),
            Some(request_id.clone()),
        )
        .map_err(|e| McpError::Protocol(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if pending.closed {
                return Err(McpError::ConnectionClosed);
            }
            pending.waiting.insert(request_id.clone(), tx);
        }

        if let Err(e) = post_json(&self.client, &self.message_url, &message).await {
            self.pending.lock().await.waiting.remove(&request_id);
            return Err(e);
        }

        match rx.await {
            Ok(ServerMessage::Response(response)) => Ok(serde_json::to_value(&response.result)?),
            Ok(ServerMessage::Error(error)) => Err(McpError::Rpc {
                code: error.error.code,
                message: error.error.message,
            }),
            Ok(_) => Err(McpError::Protocol(
                "expected a response from the tool server".to_string(),
            )),
            Err(_) => Err(McpError::ConnectionClosed),
        }
    }

    pub async fn notify(&self, notification: NotificationFromClient) -> McpResult<()> {
        let message = ClientMessage::from_message(
            MessageFromClient::NotificationFromClient(notification),
            None,
        )
        .map_err(|e| McpError::Protocol(e.to_string()))?;
        post_json(&self.client, &self.message_url, &message).await
    }

    /// Stop reading the event stream; outstanding and later requests fail with `ConnectionClosed`
    pub async fn close(&self) {
        self.reader.abort();
        self.pending.lock().await.shut();
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn post_json<T: Serialize>(client: &Client, url: &Url, body: &T) -> McpResult<()> {
    let response = client.post(url.clone()).json(body).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(McpError::UnexpectedStatus(status.as_u16()));
    }
    Ok(())
}

async fn read_messages(
    mut events: EventStream,
    pending: SharedPending,
    client: Client,
    message_url: Url,
) {
    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "tool server event stream failed");
                break;
            }
        };
        if event.kind() != "message" {
            continue;
        }

        let message = match serde_json::from_str::<ServerMessage>(&event.data) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "skipping malformed message from tool server");
                continue;
            }
        };

        match message {
            ServerMessage::Response(ref response) => {
                let id = response.id.clone();
                if let Some(tx) = pending.lock().await.waiting.remove(&id) {
                    let _ = tx.send(message);
                } else {
                    debug!(response_id = ?id, "response does not match a waiting request");
                }
            }
            ServerMessage::Error(ref error) => {
                let id = error.id.clone();
                match id {
                    Some(id) => {
                        if let Some(tx) = pending.lock().await.waiting.remove(&id) {
                            let _ = tx.send(message);
                        }
                    }
                    None => warn!(
                        code = error.error.code,
                        error_message = %error.error.message,
                        "tool server reported an error"
                    ),
                }
            }
            ServerMessage::Request(request) => {
                let method = request.method().to_string();
                let request_id = request.request_id().clone();
                let answered = if method == "ping" {
                    let reply = json!({ "jsonrpc": JSONRPC_VERSION, "id": request_id, "result": {} });
                    post_json(&client, &message_url, &reply).await
                } else {
                    let error = RpcError::method_not_found()
                        .with_message(format!("Method not found: {}", method));
                    match ClientMessage::from_message(MessageFromClient::Error(error), Some(request_id)) {
                        Ok(reply) => post_json(&client, &message_url, &reply).await,
                        Err(e) => Err(McpError::Protocol(e.to_string())),
                    }
                };
                if let Err(e) = answered {
                    warn!(%method, error = %e, "failed to answer tool server request");
                }
            }
            ServerMessage::Notification(_) => {
                debug!("tool server notification");
            }
        }
    }

    pending.lock().await.shut();
}
