//! MCP tools for remote ingestion and shape inference.
//!
//! - `types`: Serializable response types for MCP tools
//! - `commands`: MCP tool implementations

pub mod commands;
pub mod types;

pub use commands::McpIngestCommands;
