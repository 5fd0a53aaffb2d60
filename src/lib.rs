//! Remote data ingestion over SSH and byte-budgeted JSON shape inference.
//!
//! - [`shape`]: schema inference for decoded JSON and budgeted file sampling
//! - [`ssh`]: authenticated sessions, remote file streaming and tunnels
//! - [`credentials`]: remote host descriptors and secret decryption
//! - [`mcp`]: MCP tools exposing both halves

pub mod config;
pub mod credentials;
pub mod error;
pub mod mcp;
pub mod shape;
pub mod ssh;

pub use error::{Error, Result};
