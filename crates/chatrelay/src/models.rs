//! These models represent the objects passed around by the relay
//!
//! There are several different related formats we need to interact with:
//! - assistant-ui / AI SDK messages and frontend tools, sent from the browser
//! - AI SDK data stream frames, sent from the relay back to the browser
//! - openai compatible messages/tools, sent from the relay to the LLM
//! - MCP tool listings and tool results, exchanged with tool servers
//!
//! We always immediately convert those data models into the internal structs
//! using to/from helpers, so the internal models don't exactly match any of them.
pub mod content;
pub mod message;
pub mod role;
pub mod tool;
