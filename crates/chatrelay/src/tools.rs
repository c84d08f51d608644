//! Tools offered to the model: where they come from and who runs them.
mod aggregator;
mod connection;
mod manifest;
#[cfg(test)]
pub mod mock;

pub use aggregator::{AggregatorTimeouts, Gathered, ToolAggregator};
pub use connection::{ReleaseReport, ToolConnection, ToolConnections, ToolConnector, ToolServerEndpoint};
pub use manifest::{ToolEntry, ToolManifest, ToolSource};
