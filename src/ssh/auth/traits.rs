//! The seam between an open SSH handle and a credential.

use async_trait::async_trait;
use russh::client;

use crate::error::Result;
use crate::ssh::session::SshClientHandler;

/// Something that can prove a user's identity on an open handle.
///
/// `Ok(false)` means the server answered and refused the credential.
/// `Err` means the exchange itself failed.
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool>;

    /// Short label for logs and error messages.
    fn name(&self) -> &'static str;
}
