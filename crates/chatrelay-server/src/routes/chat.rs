use crate::error::ApiError;
use crate::incoming::{convert_messages, frontend_tools, ChatRequest};
use crate::state::AppState;
use axum::{
    body::Body,
    extract::State,
    http::{
        header::{CACHE_CONTROL, CONTENT_TYPE},
        HeaderMap, HeaderName, HeaderValue,
    },
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use chatrelay::agent::{Agent, ReplyState};
use chatrelay::protocol::{ProtocolFormatter, DATA_STREAM_HEADER, DATA_STREAM_VERSION};
use chatrelay::tools::{Gathered, ToolManifest};
use futures::{stream::StreamExt, Stream};
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

/// Response body speaking the AI SDK data stream protocol
pub struct DataStreamResponse {
    rx: ReceiverStream<String>,
}

impl DataStreamResponse {
    fn new(rx: ReceiverStream<String>) -> Self {
        Self { rx }
    }
}

impl Stream for DataStreamResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for DataStreamResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from_stream(self));
        let headers = response.headers_mut();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(
            HeaderName::from_static(DATA_STREAM_HEADER),
            HeaderValue::from_static(DATA_STREAM_VERSION),
        );
        response
    }
}

async fn handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<DataStreamResponse, ApiError> {
    // Check protocol header (optional in our case)
    if let Some(protocol) = headers.get("x-protocol") {
        if protocol.to_str().map(|p| p != "data").unwrap_or(true) {
            return Err(ApiError::bad_request(
                "Unsupported protocol",
                "x-protocol must be 'data'",
            ));
        }
    }

    ReplyState::Received.enter();
    let messages = convert_messages(request.messages);
    let system = request.system.unwrap_or_default();

    let frontend = frontend_tools(request.tools.as_ref()).map_err(|e| {
        ReplyState::Failed.enter();
        warn!(error = %e, "rejecting request with invalid tools");
        ApiError::internal("Invalid tool definitions", e.to_string())
    })?;

    ReplyState::Gathering.enter();
    let Gathered { connections, tools } = state.aggregator.gather(&state.tool_servers).await;
    let mut manifest = ToolManifest::from_frontend(frontend);
    manifest.merge(tools);
    info!(
        tools = manifest.len(),
        connections = connections.len(),
        messages = messages.len(),
        "starting reply"
    );

    ReplyState::Streaming.enter();
    let agent = Agent::new(state.provider.clone(), manifest, connections)
        .with_max_steps(state.max_steps)
        .with_call_timeout(state.aggregator.timeouts().call);
    let mut stream = agent.reply(system, messages).await.map_err(|e| {
        error!(error = %e, "failed to start reply stream");
        ApiError::internal("Failed to reach the model", e.to_string())
    })?;

    // Create channel for streaming
    let (tx, rx) = mpsc::channel(100);

    tokio::spawn(async move {
        loop {
            match timeout(Duration::from_millis(500), stream.next()).await {
                Ok(Some(event)) => {
                    if tx.send(ProtocolFormatter::format_event(&event)).await.is_err() {
                        warn!("client disconnected, abandoning reply");
                        break;
                    }
                }
                Ok(None) => break,
                // Heartbeat, used to detect disconnected clients while tools run
                Err(_) => {
                    if tx.is_closed() {
                        warn!("client disconnected, abandoning reply");
                        break;
                    }
                }
            }
        }
        debug!("reply stream finished");
    });

    Ok(DataStreamResponse::new(ReceiverStream::new(rx)))
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(handler))
        .with_state(state)
}
