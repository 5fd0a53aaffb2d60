//! Configuration resolution for remote ingestion.
//!
//! Values follow a three-tier priority system:
//!
//! 1. **Parameter** - Explicitly provided function parameter (highest priority)
//! 2. **Environment Variable** - Value from environment variable
//! 3. **Default** - Built-in default value (lowest priority)
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SSH_CONNECT_TIMEOUT` | 30s | Transport dial and handshake timeout in seconds |
//! | `SSH_COMPRESSION` | true | Negotiate zlib on the SSH transport |
//! | `SSH_KEY_FILES` | `~/.ssh/id_rsa:~/.ssh/id_dsa:~/.ssh/id_ed25519` | Default private key search path |
//! | `SHAPE_MAX_BYTES` | 1 MiB | Byte budget for sampled shape inference |
//! | `SHAPE_MAX_DEPTH` | 50 | Maximum container depth inferred |

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default SSH connection timeout in seconds
pub(crate) const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default byte budget for sampled shape inference
pub(crate) const DEFAULT_SHAPE_MAX_BYTES: usize = 1024 * 1024;

/// Default recursion bound for shape inference
pub(crate) const DEFAULT_SHAPE_MAX_DEPTH: usize = 50;

/// Conventional private key locations, probed in order.
pub(crate) const DEFAULT_KEY_FILES: &[&str] =
    &["~/.ssh/id_rsa", "~/.ssh/id_dsa", "~/.ssh/id_ed25519"];

pub(crate) const CONNECT_TIMEOUT_ENV_VAR: &str = "SSH_CONNECT_TIMEOUT";
pub(crate) const COMPRESSION_ENV_VAR: &str = "SSH_COMPRESSION";
pub(crate) const KEY_FILES_ENV_VAR: &str = "SSH_KEY_FILES";
pub(crate) const SHAPE_MAX_BYTES_ENV_VAR: &str = "SHAPE_MAX_BYTES";
pub(crate) const SHAPE_MAX_DEPTH_ENV_VAR: &str = "SHAPE_MAX_DEPTH";

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|value| value.parse::<T>().ok())
}

/// Resolve the connection timeout with priority: parameter -> env var -> default
pub fn resolve_connect_timeout(timeout_param: Option<u64>) -> Duration {
    let secs = timeout_param
        .or_else(|| env_parsed(CONNECT_TIMEOUT_ENV_VAR))
        .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);
    Duration::from_secs(secs)
}

/// Resolve the compression setting with priority: parameter -> env var -> default (true)
pub fn resolve_compression(compress_param: Option<bool>) -> bool {
    if let Some(compress) = compress_param {
        return compress;
    }

    if let Ok(env_compress) = env::var(COMPRESSION_ENV_VAR) {
        return env_compress.eq_ignore_ascii_case("true") || env_compress == "1";
    }

    true
}

/// Resolve the shape byte budget with priority: parameter -> env var -> default
pub fn resolve_shape_max_bytes(max_bytes_param: Option<usize>) -> usize {
    max_bytes_param
        .or_else(|| env_parsed(SHAPE_MAX_BYTES_ENV_VAR))
        .unwrap_or(DEFAULT_SHAPE_MAX_BYTES)
}

/// Resolve the shape depth bound with priority: parameter -> env var -> default
pub fn resolve_shape_max_depth(max_depth_param: Option<usize>) -> usize {
    max_depth_param
        .or_else(|| env_parsed(SHAPE_MAX_DEPTH_ENV_VAR))
        .unwrap_or(DEFAULT_SHAPE_MAX_DEPTH)
}

/// Resolve the default key search path: `SSH_KEY_FILES` (platform path-list
/// syntax) if set and non-empty, otherwise [`DEFAULT_KEY_FILES`].
///
/// Entries are returned unexpanded; `~/` is resolved when a key is loaded.
pub fn resolve_key_files() -> Vec<PathBuf> {
    if let Some(list) = env::var_os(KEY_FILES_ENV_VAR) {
        let files: Vec<PathBuf> = env::split_paths(&list)
            .filter(|p| !p.as_os_str().is_empty())
            .collect();
        if !files.is_empty() {
            return files;
        }
    }

    DEFAULT_KEY_FILES.iter().map(PathBuf::from).collect()
}
