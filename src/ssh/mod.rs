//! SSH transport: sessions, authentication, remote reads and tunnels.
//!
//! - `keys`: private key decoding into a closed [`KeyMaterial`] union
//! - `auth`: password and key authentication
//! - `client`: [`SessionFactory`], which turns a [`ServerInfo`] into an
//!   authenticated [`SshSession`]
//! - `remote`: streaming a remote file with transparent gzip decoding
//! - `forward`: one-shot local tunnels over `direct-tcpip` (feature
//!   `port_forward`, on by default)
//!
//! [`ServerInfo`]: crate::credentials::ServerInfo

pub mod auth;
pub mod client;
#[cfg(feature = "port_forward")]
pub mod forward;
pub mod keys;
pub mod peek;
pub mod remote;
pub mod session;
pub mod task;

pub use client::{KeySearchPath, SessionConfig, SessionFactory};
#[cfg(feature = "port_forward")]
pub use forward::{forward_through, with_tunnel};
pub use keys::{KeyMaterial, load_key_material};
pub use peek::PeekReader;
pub use remote::{decode_stream, read_remote_file, remote_read_command};
pub use session::SshSession;
pub use task::ScopedTask;
