//! Remote host descriptors and the credential-decryption capability.
//!
//! Secret storage lives outside this crate. Passwords and passphrases reach
//! us as [`EncryptedSecret`] values and are opened on demand through a
//! [`CredentialResolver`] supplied by the surrounding application.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Opaque error returned by a [`CredentialResolver`].
pub type ResolverError = Box<dyn std::error::Error + Send + Sync>;

/// A stored secret as it sits in configuration. Never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedSecret(String);

impl EncryptedSecret {
    pub fn new(ciphertext: impl Into<String>) -> Self {
        Self(ciphertext.into())
    }

    pub fn ciphertext(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EncryptedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptedSecret(***)")
    }
}

/// Decrypts stored passwords and passphrases.
pub trait CredentialResolver: Send + Sync {
    fn decrypt(&self, secret: &EncryptedSecret) -> Result<String, ResolverError>;
}

/// Resolver for secrets that were never encrypted, such as credentials
/// passed directly by a tool caller.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaintextResolver;

impl CredentialResolver for PlaintextResolver {
    fn decrypt(&self, secret: &EncryptedSecret) -> Result<String, ResolverError> {
        Ok(secret.ciphertext().to_string())
    }
}

/// How to authenticate against a remote host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    Password,
    PrivateKey,
    Agent,
}

impl fmt::Display for AuthKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthKind::Password => write!(f, "password"),
            AuthKind::PrivateKey => write!(f, "private key"),
            AuthKind::Agent => write!(f, "agent"),
        }
    }
}

/// Remote host descriptor. Read-only to this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    /// `host` or `host:port`; port 22 is assumed when absent.
    pub address: String,
    pub username: String,
    #[serde(rename = "type")]
    pub auth: AuthKind,
    #[serde(default)]
    pub password: Option<EncryptedSecret>,
    /// Explicit key file. When absent the default key search path is probed.
    #[serde(default)]
    pub private_key_file: Option<PathBuf>,
    #[serde(default)]
    pub passphrase: Option<EncryptedSecret>,
}

impl ServerInfo {
    pub fn with_password(
        address: impl Into<String>,
        username: impl Into<String>,
        password: EncryptedSecret,
    ) -> Self {
        Self {
            address: address.into(),
            username: username.into(),
            auth: AuthKind::Password,
            password: Some(password),
            private_key_file: None,
            passphrase: None,
        }
    }

    pub fn with_private_key(
        address: impl Into<String>,
        username: impl Into<String>,
        private_key_file: Option<PathBuf>,
        passphrase: Option<EncryptedSecret>,
    ) -> Self {
        Self {
            address: address.into(),
            username: username.into(),
            auth: AuthKind::PrivateKey,
            password: None,
            private_key_file,
            passphrase,
        }
    }
}
