//! Password authentication.

use async_trait::async_trait;
use russh::client;

use crate::error::{Error, Result};
use crate::ssh::session::SshClientHandler;

use super::traits::AuthStrategy;

/// Sends an already-decrypted password.
pub struct PasswordAuth {
    password: String,
}

impl PasswordAuth {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
        }
    }
}

#[async_trait]
impl AuthStrategy for PasswordAuth {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool> {
        handle
            .authenticate_password(username, &self.password)
            .await
            .map(|outcome| outcome.success())
            .map_err(|e| Error::Authentication(format!("password: {}", e)))
    }

    fn name(&self) -> &'static str {
        "password"
    }
}
