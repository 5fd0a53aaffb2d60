//! Authentication for SSH connections.
//!
//! - [`PasswordAuth`]: password authentication
//! - [`KeyAuth`]: public key authentication with a decoded [`KeyMaterial`]
//! - [`AuthMethod`]: the one of these a connection uses
//!
//! SSH agent authentication is not supported; the session factory rejects
//! it before any method is built.
//!
//! [`KeyMaterial`]: crate::ssh::keys::KeyMaterial

mod key;
mod method;
mod password;
mod traits;

pub use key::KeyAuth;
pub use method::AuthMethod;
pub use password::PasswordAuth;
pub use traits::AuthStrategy;
