//! Authenticated SSH transport.
//!
//! - `SshClientHandler`: a russh client handler that accepts all host keys
//!   (similar to `StrictHostKeyChecking=no` in OpenSSH).
//! - `SshSession`: one authenticated transport, owned by the single
//!   operation that created it. Sessions are never pooled or shared.
//!
//! # Security Note
//!
//! Host keys are not verified. This is a known gap in the trust model and
//! is kept until a host-key policy is defined for the surrounding product.

use russh::{Channel, Disconnect, client, keys};
use tracing::debug;

use crate::error::{Error, Result};

/// Client handler for russh that accepts all host keys.
pub struct SshClientHandler;

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &keys::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        // Accept all host keys (similar to StrictHostKeyChecking=no)
        Ok(true)
    }
}

/// An authenticated SSH transport to one remote host.
pub struct SshSession {
    handle: client::Handle<SshClientHandler>,
    address: String,
}

impl SshSession {
    pub(crate) fn new(handle: client::Handle<SshClientHandler>, address: String) -> Self {
        Self { handle, address }
    }

    /// `host:port` this session is connected to.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Start `command` on a new session channel.
    pub async fn exec(&self, command: &str) -> Result<Channel<client::Msg>> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| Error::Channel(format!("Failed to open channel: {}", e)))?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| Error::Channel(format!("Could not start session command: {}", e)))?;

        Ok(channel)
    }

    /// Open a `direct-tcpip` channel to `host:port` as seen from the remote
    /// side (RFC 4254 local forwarding).
    #[cfg(feature = "port_forward")]
    pub async fn open_direct_tcpip(&self, host: &str, port: u16) -> Result<Channel<client::Msg>> {
        self.handle
            .channel_open_direct_tcpip(host, port as u32, "127.0.0.1", 0)
            .await
            .map_err(|e| {
                Error::Channel(format!(
                    "Failed to open direct-tcpip channel to {}:{}: {}",
                    host, port, e
                ))
            })
    }

    /// Close the transport. Failures are logged, not returned: by the time
    /// we disconnect the operation's outcome is already decided.
    pub async fn disconnect(self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            debug!("Disconnect from {} failed: {}", self.address, e);
        }
    }
}
