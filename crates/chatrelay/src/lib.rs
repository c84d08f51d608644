pub mod agent;
pub mod errors;
pub mod mcp;
pub mod models;
pub mod protocol;
pub mod providers;
pub mod sse;
pub mod tools;
