//! Private key SSH authentication.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use russh::{client, keys};
use tracing::debug;

use crate::error::{Error, Result};
use crate::ssh::keys::KeyMaterial;
use crate::ssh::session::SshClientHandler;

use super::traits::AuthStrategy;

/// Public key authentication with an already-decoded key.
///
/// Key files are loaded (and decrypted) before dialing, so a bad key or
/// passphrase fails without touching the network.
pub struct KeyAuth {
    key_path: PathBuf,
    key: Arc<keys::PrivateKey>,
    rsa: bool,
}

impl KeyAuth {
    /// # Arguments
    ///
    /// * `key_path` - Where the key was loaded from, for logging
    /// * `material` - The decoded key
    pub fn new(key_path: impl Into<PathBuf>, material: KeyMaterial) -> Self {
        let rsa = material.is_rsa();
        Self {
            key_path: key_path.into(),
            key: Arc::new(material.into_private_key()),
            rsa,
        }
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }
}

#[async_trait]
impl AuthStrategy for KeyAuth {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool> {
        // For RSA keys, use the best supported hash algorithm
        let hash_alg = if self.rsa {
            handle
                .best_supported_rsa_hash()
                .await
                .ok()
                .flatten()
                .flatten()
        } else {
            None
        };
        debug!(
            "Using key {:?} with RSA hash algorithm {:?}",
            self.key_path, hash_alg
        );

        let key_with_hash = keys::PrivateKeyWithHashAlg::new(self.key.clone(), hash_alg);

        let result = handle
            .authenticate_publickey(username, key_with_hash)
            .await
            .map_err(|e| Error::Authentication(format!("key {:?}: {}", self.key_path, e)))?;

        Ok(result.success())
    }

    fn name(&self) -> &'static str {
        "key"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::keys::load_key_material;

    fn ed25519_fixture() -> (PathBuf, KeyMaterial) {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata/keys/id_ed25519");
        let material = load_key_material(&path, "").unwrap();
        (path, material)
    }

    #[test]
    fn test_key_auth_name() {
        let (path, material) = ed25519_fixture();
        let auth = KeyAuth::new(path, material);
        assert_eq!(auth.name(), "key");
    }

    #[test]
    fn test_key_auth_keeps_path() {
        let (path, material) = ed25519_fixture();
        let auth = KeyAuth::new(path.clone(), material);
        assert_eq!(auth.key_path(), path.as_path());
        assert!(!auth.rsa);
    }
}
