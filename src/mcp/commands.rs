//! MCP ingestion commands.
//!
//! This module provides the MCP tool implementations:
//!
//! - `shape_from_file`: Infer the JSON shape of a local file within a byte budget
//! - `remote_shape`: Stream a remote file over SSH and infer its shape
//!
//! Credentials passed to tools are plaintext and go through
//! [`PlaintextResolver`]. Every call opens its own SSH session; nothing is
//! pooled between calls.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use poem_mcpserver::{Tools, tool::StructuredContent};
use tracing::{error, info};

use super::types::ShapeResponse;
use crate::config::{
    resolve_compression, resolve_connect_timeout, resolve_shape_max_bytes, resolve_shape_max_depth,
};
use crate::credentials::{EncryptedSecret, PlaintextResolver, ServerInfo};
use crate::shape;
use crate::ssh::{KeySearchPath, SessionConfig, SessionFactory, read_remote_file};

/// MCP ingestion tool implementation.
pub struct McpIngestCommands;

#[Tools]
impl McpIngestCommands {
    /// Infer the structural shape of a local JSON file.
    ///
    /// Reads at most `max_bytes`. Larger files are cut at the last complete
    /// array element and closed before decoding; the call fails if the budget
    /// does not hold a single complete element.
    async fn shape_from_file(
        &self,
        /// Path of the JSON file on the machine running this server
        path: String,
        /// Label for the root of the shape (default: the file path)
        label: Option<String>,
        /// Byte budget for sampling (default: 1048576, env: SHAPE_MAX_BYTES)
        max_bytes: Option<usize>,
        /// Maximum container depth to infer (default: 50, env: SHAPE_MAX_DEPTH)
        max_depth: Option<usize>,
    ) -> Result<StructuredContent<ShapeResponse>, String> {
        let max_bytes = resolve_shape_max_bytes(max_bytes);
        let max_depth = resolve_shape_max_depth(max_depth);
        let label = label.unwrap_or_else(|| path.clone());

        match shape::shape_from_file(&path, &label, max_bytes, max_depth).await {
            Ok(shape) => {
                info!("Inferred shape of {}", path);
                Ok(StructuredContent(ShapeResponse {
                    source: path,
                    shape,
                    max_bytes,
                    max_depth,
                }))
            }
            Err(e) => {
                error!("Shape inference for {} failed: {}", path, e);
                Err(e.to_string())
            }
        }
    }

    /// Read a JSON file on a remote host over SSH and infer its shape.
    ///
    /// The file is streamed gzip-compressed when the remote host has gzip.
    /// Authenticates with `password` if given, otherwise with `key_path`, and
    /// otherwise with the first usable key in the default search path
    /// (env: SSH_KEY_FILES).
    #[allow(clippy::too_many_arguments)]
    async fn remote_shape(
        &self,
        /// SSH server address in format "host:port" (e.g., "192.168.1.1:22")
        address: String,
        /// SSH username for authentication
        username: String,
        /// Password for password-based authentication (optional if using a key)
        password: Option<String>,
        /// Path to private key file for key-based authentication (optional)
        key_path: Option<String>,
        /// Passphrase for an encrypted private key (optional)
        passphrase: Option<String>,
        /// Absolute path of the JSON file on the remote host
        remote_path: String,
        /// Byte budget for sampling (default: 1048576, env: SHAPE_MAX_BYTES)
        max_bytes: Option<usize>,
        /// Maximum container depth to infer (default: 50, env: SHAPE_MAX_DEPTH)
        max_depth: Option<usize>,
        /// Connection timeout in seconds (default: 30, env: SSH_CONNECT_TIMEOUT)
        timeout_secs: Option<u64>,
        /// Enable zlib compression for the SSH connection (default: true, env: SSH_COMPRESSION)
        compress: Option<bool>,
    ) -> Result<StructuredContent<ShapeResponse>, String> {
        let max_bytes = resolve_shape_max_bytes(max_bytes);
        let max_depth = resolve_shape_max_depth(max_depth);
        let source = format!("{}@{}:{}", username, address, remote_path);
        let server = server_from_params(address, username, password, key_path, passphrase);

        let factory = SessionFactory::new(
            Arc::new(PlaintextResolver),
            SessionConfig {
                connect_timeout: resolve_connect_timeout(timeout_secs),
                compress: resolve_compression(compress),
                key_search_path: KeySearchPath::from_env(),
            },
        );

        let label = remote_path.clone();
        let consume = move |reader: &mut dyn Read| {
            shape::shape_from_reader(reader, &label, max_bytes, max_depth)
        };
        let result = read_remote_file(&factory, &server, &remote_path, consume).await;

        match result {
            Ok(shape) => {
                info!("Inferred shape of {}", source);
                Ok(StructuredContent(ShapeResponse {
                    source,
                    shape,
                    max_bytes,
                    max_depth,
                }))
            }
            Err(e) => {
                error!("Remote shape inference for {} failed: {}", source, e);
                Err(e.to_string())
            }
        }
    }
}

/// Build a host descriptor from tool parameters. A password selects
/// password authentication; anything else selects key authentication.
pub(crate) fn server_from_params(
    address: String,
    username: String,
    password: Option<String>,
    key_path: Option<String>,
    passphrase: Option<String>,
) -> ServerInfo {
    match password {
        Some(password) => {
            ServerInfo::with_password(address, username, EncryptedSecret::new(password))
        }
        None => ServerInfo::with_private_key(
            address,
            username,
            key_path.map(PathBuf::from),
            passphrase.map(EncryptedSecret::new),
        ),
    }
}
