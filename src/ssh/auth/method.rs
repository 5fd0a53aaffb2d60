//! The authentication method picked for one connection.

use std::path::PathBuf;

use russh::client;
use tracing::debug;

use crate::error::{Error, Result};
use crate::ssh::keys::KeyMaterial;
use crate::ssh::session::SshClientHandler;

use super::traits::AuthStrategy;
use super::{KeyAuth, PasswordAuth};

/// Exactly one way of proving identity to the server.
///
/// A server descriptor selects either a password or a key, never both, so
/// there is nothing to fall back to once the selected method is rejected.
pub enum AuthMethod {
    Password(PasswordAuth),
    Key(KeyAuth),
    /// No default key could be loaded. Dialing still happens and then fails
    /// with [`Error::Authentication`].
    Unavailable,
}

impl AuthMethod {
    pub fn password(password: impl Into<String>) -> Self {
        Self::Password(PasswordAuth::new(password))
    }

    pub fn key(key_path: impl Into<PathBuf>, material: KeyMaterial) -> Self {
        Self::Key(KeyAuth::new(key_path, material))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Password(auth) => auth.name(),
            Self::Key(auth) => auth.name(),
            Self::Unavailable => "none",
        }
    }

    /// Authenticate `username` on an open handle. A rejection is an error.
    pub async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<()> {
        let strategy: &dyn AuthStrategy = match self {
            Self::Password(auth) => auth,
            Self::Key(auth) => auth,
            Self::Unavailable => {
                return Err(Error::Authentication(
                    "no authentication methods available".to_string(),
                ));
            }
        };

        debug!("Authenticating {} with {}", username, strategy.name());
        if strategy.authenticate(handle, username).await? {
            Ok(())
        } else {
            Err(Error::Authentication(format!(
                "{} authentication rejected",
                strategy.name()
            )))
        }
    }
}
