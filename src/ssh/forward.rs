//! One-shot local tunnels through an SSH `direct-tcpip` channel (RFC 4254).
//!
//! [`with_tunnel`] binds an ephemeral listener on the loopback interface,
//! dials the target through a fresh SSH session and hands `body` the local
//! endpoint to use instead of the real one. Exactly one local connection is
//! proxied:
//!
//! - Local client -> SSH channel -> target
//! - Target -> SSH channel -> local client
//!
//! The proxy runs in a [`ScopedTask`], so the listener and both sockets are
//! closed when the call returns, whatever the outcome. Copy failures are
//! reported on a small channel that is checked once `body` has finished.

use std::future::Future;
use std::io;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::debug;

use crate::credentials::ServerInfo;
use crate::error::Error;
use crate::ssh::client::SessionFactory;
use crate::ssh::task::ScopedTask;

/// Host the tunnel listens on, and the name handed to `body` for it.
pub const LOCAL_HOST: &str = "localhost";

/// Accept failure plus one failure per copy direction.
const ERROR_CHANNEL_CAPACITY: usize = 3;

/// Run `body` against `target_host:target_port`, through an SSH tunnel when
/// `server` is given.
///
/// Without a server, `body` is called with the target unchanged. With one,
/// it is called with [`LOCAL_HOST`] and a port that is already listening.
/// An error from `body` is returned as is; otherwise any tunnel fault
/// already reported is surfaced as [`Error::Tunnel`].
pub async fn with_tunnel<T, E, F, Fut>(
    factory: &SessionFactory,
    server: Option<&ServerInfo>,
    target_host: &str,
    target_port: u16,
    body: F,
) -> Result<T, E>
where
    E: From<Error>,
    F: FnOnce(String, u16) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let Some(server) = server else {
        debug!(
            "No tunnel configured, connecting to {}:{} directly",
            target_host, target_port
        );
        return body(target_host.to_string(), target_port).await;
    };

    // Bound before dialing so `body` never sees a port that isn't listening
    let listener = bind_local().await?;

    let session = factory.connect(server).await?;
    let outcome = match session.open_direct_tcpip(target_host, target_port).await {
        Ok(channel) => {
            debug!(
                "Tunnel to {}:{} via {} established",
                target_host,
                target_port,
                session.address()
            );
            forward_through(listener, channel.into_stream(), body).await
        }
        Err(e) => Err(e.into()),
    };
    session.disconnect().await;
    outcome
}

/// Bind an ephemeral port on [`LOCAL_HOST`].
pub async fn bind_local() -> Result<TcpListener, Error> {
    TcpListener::bind((LOCAL_HOST, 0))
        .await
        .map_err(Error::Tunnel)
}

/// Proxy the first connection accepted on `listener` to `remote` while
/// `body` runs.
pub async fn forward_through<S, T, E, F, Fut>(
    listener: TcpListener,
    remote: S,
    body: F,
) -> Result<T, E>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    E: From<Error>,
    F: FnOnce(String, u16) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let port = listener.local_addr().map_err(Error::Tunnel)?.port();
    let (errors_tx, mut errors_rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);
    let _proxy = ScopedTask::spawn(proxy_one(listener, remote, errors_tx));

    debug!("Tunnel listening on {}:{}", LOCAL_HOST, port);
    let value = body(LOCAL_HOST.to_string(), port).await?;

    while let Ok(e) = errors_rx.try_recv() {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            debug!("Tunnel closed by peer: {}", e);
            continue;
        }
        return Err(Error::Tunnel(e).into());
    }
    Ok(value)
}

async fn proxy_one<S>(listener: TcpListener, remote: S, errors: mpsc::Sender<io::Error>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let local = match listener.accept().await {
        Ok((stream, peer)) => {
            debug!("Tunnel accepted connection from {}", peer);
            stream
        }
        Err(e) => {
            let _ = errors.send(e).await;
            return;
        }
    };
    // One connection per tunnel
    drop(listener);

    let (mut local_read, mut local_write) = tokio::io::split(local);
    let (mut remote_read, mut remote_write) = tokio::io::split(remote);

    let upstream = async {
        let result = tokio::io::copy(&mut local_read, &mut remote_write).await;
        let _ = remote_write.shutdown().await;
        report(&errors, "local to remote", result).await;
    };
    let downstream = async {
        let result = tokio::io::copy(&mut remote_read, &mut local_write).await;
        let _ = local_write.shutdown().await;
        report(&errors, "remote to local", result).await;
    };

    tokio::join!(upstream, downstream);
    debug!("Tunnel connection closed");
}

async fn report(errors: &mpsc::Sender<io::Error>, direction: &str, result: io::Result<u64>) {
    match result {
        Ok(bytes) => debug!("Tunnel copy {} finished after {} bytes", direction, bytes),
        Err(e) => {
            debug!("Tunnel copy {} failed: {}", direction, e);
            let _ = errors.send(e).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::sync::Arc;
    use std::task::{Context, Poll};

    use tokio::io::{AsyncReadExt, ReadBuf};
    use tokio::net::TcpStream;

    use super::*;
    use crate::credentials::PlaintextResolver;
    use crate::ssh::client::SessionConfig;

    /// Stands in for a remote side whose reads and writes always fail.
    struct BrokenRemote(io::ErrorKind);

    impl AsyncRead for BrokenRemote {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(self.0, "remote went away")))
        }
    }

    impl AsyncWrite for BrokenRemote {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(self.0, "remote went away")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    async fn loopback_listener() -> TcpListener {
        bind_local().await.unwrap()
    }

    /// Echo server accepting one connection; returns its port.
    async fn spawn_echo_server() -> u16 {
        let listener = loopback_listener().await;
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let (mut read, mut write) = stream.split();
            let _ = tokio::io::copy(&mut read, &mut write).await;
        });
        port
    }

    /// Connect to the tunnel and read until the proxy closes it.
    async fn drain(host: String, port: u16) -> Result<Vec<u8>, Error> {
        let mut stream = TcpStream::connect((host.as_str(), port)).await?;
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await?;
        Ok(out)
    }

    #[tokio::test]
    async fn test_without_server_passes_through() {
        let factory = SessionFactory::new(Arc::new(PlaintextResolver), SessionConfig::default());
        let (host, port) = with_tunnel(&factory, None, "db.internal", 5432, |host, port| {
            async move { Ok::<_, Error>((host, port)) }
        })
        .await
        .unwrap();
        assert_eq!(host, "db.internal");
        assert_eq!(port, 5432);
    }

    #[tokio::test]
    async fn test_listener_reachable_by_local_host_name() {
        let listener = bind_local().await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await.map(|_| ()) });
        TcpStream::connect((LOCAL_HOST, port)).await.unwrap();
        accept.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_proxies_bytes_to_remote() {
        let echo_port = spawn_echo_server().await;
        let remote = TcpStream::connect((LOCAL_HOST, echo_port)).await.unwrap();
        let listener = loopback_listener().await;
        let listen_port = listener.local_addr().unwrap().port();

        let reply = forward_through(listener, remote, |host, port| async move {
            assert_eq!(host, LOCAL_HOST);
            assert_eq!(port, listen_port);
            let mut stream = TcpStream::connect((host.as_str(), port)).await?;
            stream.write_all(b"ping").await?;
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).await?;
            Ok::<_, Error>(buf)
        })
        .await
        .unwrap();

        assert_eq!(&reply, b"ping");
    }

    #[tokio::test]
    async fn test_body_error_wins() {
        let echo_port = spawn_echo_server().await;
        let remote = TcpStream::connect((LOCAL_HOST, echo_port)).await.unwrap();
        let listener = loopback_listener().await;

        let result: Result<(), Error> = forward_through(listener, remote, |_, _| async {
            Err(Error::Channel("query failed".to_string()))
        })
        .await;

        assert!(matches!(result, Err(Error::Channel(_))));
    }

    #[tokio::test]
    async fn test_copy_failure_is_tunnel_error() {
        let listener = loopback_listener().await;
        let result = forward_through(
            listener,
            BrokenRemote(io::ErrorKind::ConnectionReset),
            drain,
        )
        .await;

        match result {
            Err(Error::Tunnel(e)) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("expected tunnel error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unexpected_eof_is_clean_close() {
        let listener = loopback_listener().await;
        let received = forward_through(
            listener,
            BrokenRemote(io::ErrorKind::UnexpectedEof),
            drain,
        )
        .await
        .unwrap();
        assert!(received.is_empty());
    }

    #[tokio::test]
    async fn test_unused_tunnel_is_torn_down() {
        let echo_port = spawn_echo_server().await;
        let remote = TcpStream::connect((LOCAL_HOST, echo_port)).await.unwrap();
        let listener = loopback_listener().await;

        let port = forward_through(listener, remote, |_, port| async move { Ok::<_, Error>(port) })
            .await
            .unwrap();

        // Give the runtime a moment to run the abort
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(TcpStream::connect((LOCAL_HOST, port)).await.is_err());
    }
}
