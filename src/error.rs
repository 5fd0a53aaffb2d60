//! Error types for remote ingestion and shape inference.
//!
//! Every failure the crate can report is a variant of [`Error`]. The variants
//! map onto the failure kinds callers need to tell apart:
//!
//! - **Credentials**: a stored password or passphrase could not be decrypted
//!   ([`Error::CredentialDecryption`]).
//! - **Key material**: the key file could not be read, decoded, decrypted or
//!   parsed, or declares a type we do not handle.
//! - **Transport**: unsupported authentication kinds, rejected credentials,
//!   dial failures and channel failures.
//! - **Remote command**: the remote read command exited non-zero. This is
//!   reported after the consumer has run, so partially consumed data is kept.
//! - **Sampling**: the byte budget contained no safe truncation point
//!   ([`Error::TruncationBoundaryNotFound`]), which is distinct from a JSON
//!   syntax error ([`Error::Json`]).
//!
//! No operation is retried; every variant is terminal for the attempt that
//! produced it.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The credential resolver could not decrypt a stored secret.
    #[error("Could not decrypt server SSH {what}: {reason}")]
    CredentialDecryption { what: &'static str, reason: String },

    #[error("Unable to read private key {path:?}: {source}")]
    KeyRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Private key decode failed for {path:?}: {reason}")]
    KeyDecode { path: PathBuf, reason: String },

    /// The key is encrypted and the passphrase did not open it.
    #[error("Decrypting private key {path:?} failed: {reason}")]
    KeyDecryption { path: PathBuf, reason: String },

    #[error("Unsupported private key type: {0}")]
    UnsupportedKeyType(String),

    #[error("Parsing {key_type} private key failed: {reason}")]
    KeyParse { key_type: String, reason: String },

    #[error("SSH {0} authentication is not supported yet")]
    UnsupportedAuth(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Could not connect to remote server {address}: {reason}")]
    Connection { address: String, reason: String },

    #[error("SSH channel error: {0}")]
    Channel(String),

    /// The remote read command finished unsuccessfully. `status` is `None`
    /// when the server closed the channel without reporting one.
    #[error("Could not complete session (exit status {status:?}): {stderr}")]
    RemoteCommand { status: Option<u32>, stderr: String },

    #[error("Tunnel fault: {0}")]
    Tunnel(#[source] io::Error),

    /// The byte budget was too small to hold one complete element.
    #[error("No safe truncation point within the first {max_bytes} bytes")]
    TruncationBoundaryNotFound { max_bytes: usize },

    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("Background task failed: {0}")]
    TaskJoin(String),
}

impl Error {
    /// Whether this error came from opening key material with a passphrase.
    pub fn is_decryption_failure(&self) -> bool {
        matches!(
            self,
            Error::KeyDecryption { .. } | Error::CredentialDecryption { .. }
        )
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::TaskJoin(err.to_string())
    }
}
