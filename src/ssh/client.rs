//! SSH session factory.
//!
//! Turns a [`ServerInfo`] into an authenticated [`SshSession`]:
//!
//! 1. **Credentials**: stored secrets are opened through the
//!    [`CredentialResolver`]. A failure here never reaches the network.
//! 2. **Key material**: an explicit key file is loaded and decrypted with the
//!    passphrase. Without one, the [`KeySearchPath`] is probed in order and
//!    the first key that opens with an empty passphrase is used.
//! 3. **Address parsing**: `host`, `host:port`, `[v6]:port` or a bare IPv6
//!    literal. Port 22 is assumed when none is given.
//! 4. **Dial**: bounded by the connect timeout; failures map to
//!    [`Error::Connection`].
//! 5. **Authentication**: with the single [`AuthMethod`] the descriptor selects.
//!
//! Nothing here is retried. Every failure is terminal for the attempt.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use russh::client;
use tracing::{debug, info, warn};

use crate::config::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_KEY_FILES, resolve_compression,
    resolve_connect_timeout, resolve_key_files,
};
use crate::credentials::{AuthKind, CredentialResolver, EncryptedSecret, ServerInfo};
use crate::error::{Error, Result};
use crate::ssh::auth::AuthMethod;
use crate::ssh::keys::{KeyMaterial, load_key_material, resolve_key_path};
use crate::ssh::session::{SshClientHandler, SshSession};

const DEFAULT_SSH_PORT: u16 = 22;

/// Ordered list of private key files tried when a server has no explicit key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySearchPath(Vec<PathBuf>);

impl KeySearchPath {
    pub fn new<P: Into<PathBuf>>(paths: impl IntoIterator<Item = P>) -> Self {
        Self(paths.into_iter().map(Into::into).collect())
    }

    /// `SSH_KEY_FILES` if set, otherwise the conventional locations.
    pub fn from_env() -> Self {
        Self(resolve_key_files())
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.0
    }
}

impl Default for KeySearchPath {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_FILES.iter().copied())
    }
}

/// Transport settings shared by every session a factory builds.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bound on TCP dial plus SSH handshake.
    pub connect_timeout: Duration,
    /// Offer zlib compression on the transport.
    pub compress: bool,
    pub key_search_path: KeySearchPath,
}

impl SessionConfig {
    /// Resolve every setting from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            connect_timeout: resolve_connect_timeout(None),
            compress: resolve_compression(None),
            key_search_path: KeySearchPath::from_env(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            compress: true,
            key_search_path: KeySearchPath::default(),
        }
    }
}

/// Builds authenticated sessions. Each call to [`connect`](Self::connect)
/// yields a fresh transport owned by the caller.
#[derive(Clone)]
pub struct SessionFactory {
    resolver: Arc<dyn CredentialResolver>,
    config: SessionConfig,
}

impl SessionFactory {
    pub fn new(resolver: Arc<dyn CredentialResolver>, config: SessionConfig) -> Self {
        Self { resolver, config }
    }

    /// Open a stored secret. An absent secret is the empty string.
    fn decrypt(&self, secret: Option<&EncryptedSecret>, what: &'static str) -> Result<String> {
        match secret {
            None => Ok(String::new()),
            Some(secret) => {
                self.resolver
                    .decrypt(secret)
                    .map_err(|e| Error::CredentialDecryption {
                        what,
                        reason: e.to_string(),
                    })
            }
        }
    }

    /// Pick and prepare the authentication method for `server` without
    /// dialing.
    ///
    /// When no default key could be loaded the method is
    /// [`AuthMethod::Unavailable`]; dialing then fails with
    /// [`Error::Authentication`].
    pub async fn build_auth(&self, server: &ServerInfo) -> Result<AuthMethod> {
        match server.auth {
            AuthKind::Password => {
                let password = self.decrypt(server.password.as_ref(), "password")?;
                Ok(AuthMethod::password(password))
            }
            AuthKind::PrivateKey => {
                let passphrase = self.decrypt(server.passphrase.as_ref(), "passphrase")?;

                match &server.private_key_file {
                    Some(path) => {
                        let key_path = path.clone();
                        let material = tokio::task::spawn_blocking(move || {
                            load_key_material(&key_path, &passphrase)
                        })
                        .await??;
                        debug!("Loaded {} key from {:?}", material.algorithm_name(), path);
                        Ok(AuthMethod::key(path.clone(), material))
                    }
                    None => {
                        let paths = self.config.key_search_path.paths().to_vec();
                        let found =
                            tokio::task::spawn_blocking(move || probe_key_files(&paths)).await?;
                        match found {
                            Some((path, material)) => Ok(AuthMethod::key(path, material)),
                            None => {
                                warn!(
                                    "No usable private key in default search path for {}@{}",
                                    server.username, server.address
                                );
                                Ok(AuthMethod::Unavailable)
                            }
                        }
                    }
                }
            }
            AuthKind::Agent => Err(Error::UnsupportedAuth(AuthKind::Agent.to_string())),
        }
    }

    /// Authenticate and dial `server`.
    pub async fn connect(&self, server: &ServerInfo) -> Result<SshSession> {
        let auth = self.build_auth(server).await?;
        let (host, port) = parse_address(&server.address)?;
        let timeout = self.config.connect_timeout;
        let config = build_client_config(self.config.compress);

        info!("Connecting to {}@{}:{}", server.username, host, port);

        let connect_future = client::connect(config, (host.as_str(), port), SshClientHandler);
        let mut handle = tokio::time::timeout(timeout, connect_future)
            .await
            .map_err(|_| Error::Connection {
                address: server.address.clone(),
                reason: format!("timed out after {:?}", timeout),
            })?
            .map_err(|e| Error::Connection {
                address: server.address.clone(),
                reason: e.to_string(),
            })?;

        auth.authenticate(&mut handle, &server.username).await?;

        info!("Authenticated as {}@{}:{}", server.username, host, port);
        Ok(SshSession::new(handle, server.address.clone()))
    }
}

/// Try each key file in order with an empty passphrase and return the
/// first one that loads. Missing files are skipped quietly, broken ones
/// with a warning.
pub(crate) fn probe_key_files(paths: &[PathBuf]) -> Option<(PathBuf, KeyMaterial)> {
    for path in paths {
        let resolved = resolve_key_path(path);
        if !resolved.is_file() {
            debug!("Default key {:?} not present", resolved);
            continue;
        }

        match load_key_material(&resolved, "") {
            Ok(material) => {
                debug!(
                    "Using default {} key {:?}",
                    material.algorithm_name(),
                    resolved
                );
                return Some((resolved, material));
            }
            Err(e) => warn!("Skipping default key {:?}: {}", resolved, e),
        }
    }
    None
}

/// Build the russh client configuration.
///
/// No inactivity timeout: a remote read may legitimately stream for a long
/// time. Keepalives detect dead peers instead.
pub(crate) fn build_client_config(compress: bool) -> Arc<client::Config> {
    let compression = if compress {
        (&[russh::compression::ZLIB, russh::compression::NONE][..]).into()
    } else {
        (&[russh::compression::NONE][..]).into()
    };

    let preferred = russh::Preferred {
        compression,
        ..Default::default()
    };

    Arc::new(client::Config {
        inactivity_timeout: None,
        keepalive_interval: Some(Duration::from_secs(30)),
        keepalive_max: 3,
        preferred,
        ..Default::default()
    })
}

/// Split an address into host and port, defaulting the port to 22.
///
/// Accepts `host`, `host:port`, `[v6]`, `[v6]:port` and bare IPv6 literals.
/// Brackets are stripped from the returned host.
pub(crate) fn parse_address(address: &str) -> Result<(String, u16)> {
    let invalid = |reason: String| Error::InvalidAddress {
        address: address.to_string(),
        reason,
    };

    if let Some(rest) = address.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| invalid("missing closing ']'".to_string()))?;
        let port = match tail {
            "" => DEFAULT_SSH_PORT,
            _ => {
                let port_str = tail
                    .strip_prefix(':')
                    .ok_or_else(|| invalid(format!("unexpected {:?} after ']'", tail)))?;
                parse_port(port_str).map_err(invalid)?
            }
        };
        return Ok((host.to_string(), port));
    }

    match address.split_once(':') {
        // Bare IPv6 literal: more than one colon and no brackets
        Some((_, rest)) if rest.contains(':') => Ok((address.to_string(), DEFAULT_SSH_PORT)),
        Some((host, port_str)) => Ok((host.to_string(), parse_port(port_str).map_err(invalid)?)),
        None => Ok((address.to_string(), DEFAULT_SSH_PORT)),
    }
}

fn parse_port(port_str: &str) -> std::result::Result<u16, String> {
    port_str
        .parse::<u16>()
        .map_err(|e| format!("Invalid port number: {}", e))
}
