//! Private key loading.
//!
//! A key file is classified by its PEM envelope before any decoding: the
//! `-----BEGIN <label>-----` line declares the key type, and either the
//! legacy `Proc-Type: 4,ENCRYPTED` header, the PKCS#8 `ENCRYPTED PRIVATE KEY`
//! label, or the OpenSSH cipher field tells whether a passphrase is needed.
//! Decoding then yields a [`KeyMaterial`], a closed union over the key
//! algorithms we can sign with.
//!
//! [`Error::KeyDecryption`] is reserved for a missing or wrong passphrase.
//! A key in a format or cipher we cannot read at all reports
//! [`Error::KeyParse`] or [`Error::UnsupportedKeyType`] instead, so a wrong
//! passphrase is distinguishable from a file that would never open.

use std::fmt;
use std::path::{Path, PathBuf};

use russh::keys::{self, Algorithm, PrivateKey};

use crate::error::{Error, Result};

/// `DEK-Info` ciphers that legacy encrypted PEM keys can be opened with.
const LEGACY_PEM_CIPHERS: &[&str] = &["AES-128-CBC", "AES-256-CBC"];

/// Key type declared by the PEM label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredKeyType {
    /// `RSA PRIVATE KEY` (PKCS#1)
    Rsa,
    /// `EC PRIVATE KEY` (SEC1)
    Ec,
    /// `DSA PRIVATE KEY`
    Dsa,
    /// `OPENSSH PRIVATE KEY`
    OpenSsh,
    /// `PRIVATE KEY` or `ENCRYPTED PRIVATE KEY` (PKCS#8)
    Pkcs8,
}

impl DeclaredKeyType {
    fn from_label(label: &str) -> Result<Self> {
        match label {
            "RSA PRIVATE KEY" => Ok(Self::Rsa),
            "EC PRIVATE KEY" => Ok(Self::Ec),
            "DSA PRIVATE KEY" => Ok(Self::Dsa),
            "OPENSSH PRIVATE KEY" => Ok(Self::OpenSsh),
            "PRIVATE KEY" | "ENCRYPTED PRIVATE KEY" => Ok(Self::Pkcs8),
            other => Err(Error::UnsupportedKeyType(other.to_string())),
        }
    }
}

impl fmt::Display for DeclaredKeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rsa => "RSA",
            Self::Ec => "EC",
            Self::Dsa => "DSA",
            Self::OpenSsh => "OpenSSH",
            Self::Pkcs8 => "PKCS#8",
        };
        f.write_str(name)
    }
}

/// The outer PEM framing of a key file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PemEnvelope {
    pub label: String,
    /// Encryption visible from the envelope alone. OpenSSH keys carry their
    /// cipher inside the body, see [`decode_key_material`].
    pub encrypted: bool,
    /// Cipher named by a legacy `DEK-Info` header.
    pub cipher: Option<String>,
}

impl PemEnvelope {
    /// Find the first PEM block in `text`. Returns `None` when there is none.
    pub fn parse(text: &str) -> Option<Self> {
        let mut lines = text.lines().map(str::trim);
        let label = lines.find_map(|line| {
            line.strip_prefix("-----BEGIN ")
                .and_then(|rest| rest.strip_suffix("-----"))
        })?;

        let mut encrypted = label == "ENCRYPTED PRIVATE KEY";
        let mut cipher = None;
        for line in lines {
            if line.starts_with("-----END ") {
                break;
            }
            if line.starts_with("Proc-Type:") && line.contains("ENCRYPTED") {
                encrypted = true;
            }
            if let Some(info) = line.strip_prefix("DEK-Info:") {
                let name = info.trim().split(',').next().unwrap_or_default();
                cipher = Some(name.to_string());
            }
        }

        Some(Self {
            label: label.to_string(),
            encrypted,
            cipher,
        })
    }

    pub fn declared_type(&self) -> Result<DeclaredKeyType> {
        DeclaredKeyType::from_label(&self.label)
    }
}

/// Decoded private key, tagged by algorithm.
#[derive(Debug, Clone)]
pub enum KeyMaterial {
    Rsa(PrivateKey),
    Ecdsa(PrivateKey),
    Dsa(PrivateKey),
    Ed25519(PrivateKey),
}

impl KeyMaterial {
    fn from_private_key(key: PrivateKey) -> Result<Self> {
        match key.algorithm() {
            Algorithm::Rsa { .. } => Ok(Self::Rsa(key)),
            Algorithm::Ecdsa { .. } => Ok(Self::Ecdsa(key)),
            Algorithm::Dsa => Ok(Self::Dsa(key)),
            Algorithm::Ed25519 => Ok(Self::Ed25519(key)),
            other => Err(Error::UnsupportedKeyType(other.to_string())),
        }
    }

    pub fn algorithm_name(&self) -> &'static str {
        match self {
            Self::Rsa(_) => "rsa",
            Self::Ecdsa(_) => "ecdsa",
            Self::Dsa(_) => "dsa",
            Self::Ed25519(_) => "ed25519",
        }
    }

    pub fn is_rsa(&self) -> bool {
        matches!(self, Self::Rsa(_))
    }

    pub fn into_private_key(self) -> PrivateKey {
        match self {
            Self::Rsa(key) | Self::Ecdsa(key) | Self::Dsa(key) | Self::Ed25519(key) => key,
        }
    }
}

/// Expand a leading `~` against the user's home directory.
pub fn resolve_key_path(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Decode key file contents. `origin` is only used in error messages.
///
/// An empty `passphrase` means "none".
pub fn decode_key_material(text: &str, origin: &Path, passphrase: &str) -> Result<KeyMaterial> {
    let envelope = PemEnvelope::parse(text).ok_or_else(|| Error::KeyDecode {
        path: origin.to_path_buf(),
        reason: "no PEM block found".to_string(),
    })?;
    let declared = envelope.declared_type()?;
    let parse_error = |reason: String| Error::KeyParse {
        key_type: declared.to_string(),
        reason,
    };
    let decryption_error = |reason: String| Error::KeyDecryption {
        path: origin.to_path_buf(),
        reason,
    };

    if declared == DeclaredKeyType::OpenSsh {
        // The body parses without the passphrase, so only `decrypt` can fail
        // on a bad one.
        let key = PrivateKey::from_openssh(text).map_err(|e| parse_error(e.to_string()))?;
        let key = if key.is_encrypted() {
            if passphrase.is_empty() {
                return Err(decryption_error(NO_PASSPHRASE.to_string()));
            }
            key.decrypt(passphrase)
                .map_err(|e| decryption_error(e.to_string()))?
        } else {
            key
        };
        return KeyMaterial::from_private_key(key);
    }

    if let Some(cipher) = &envelope.cipher {
        if !LEGACY_PEM_CIPHERS.contains(&cipher.as_str()) {
            return Err(parse_error(format!("unsupported cipher {}", cipher)));
        }
    }

    if !envelope.encrypted {
        let key = keys::decode_secret_key(text, None).map_err(|e| parse_error(e.to_string()))?;
        return KeyMaterial::from_private_key(key);
    }

    if passphrase.is_empty() {
        return Err(decryption_error(NO_PASSPHRASE.to_string()));
    }
    let key = keys::decode_secret_key(text, Some(passphrase))
        .map_err(|e| decryption_error(e.to_string()))?;
    KeyMaterial::from_private_key(key)
}

const NO_PASSPHRASE: &str = "key is encrypted and no passphrase was given";

/// Read and decode a private key file.
///
/// Blocking: encrypted OpenSSH keys run a deliberately slow KDF, so async
/// callers should use `spawn_blocking`.
pub fn load_key_material(path: &Path, passphrase: &str) -> Result<KeyMaterial> {
    let resolved = resolve_key_path(path);
    let text = std::fs::read_to_string(&resolved).map_err(|source| Error::KeyRead {
        path: resolved.clone(),
        source,
    })?;
    decode_key_material(&text, &resolved, passphrase)
}
