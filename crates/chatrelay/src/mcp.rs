//! Model Context Protocol client for tool servers reached over HTTP + SSE.
//!
//! The transport keeps one long-lived `GET` event stream open per server; the
//! server announces a message endpoint on it, requests are `POST`ed there and
//! responses come back as `message` events on the stream.
mod client;
mod connector;
mod errors;
mod transport;
pub mod types;

pub use client::McpClient;
pub use connector::SseConnector;
pub use errors::{McpError, McpResult};
pub use transport::SseTransport;
