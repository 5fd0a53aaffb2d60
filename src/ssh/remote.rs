//! Remote file reads over an exec channel.
//!
//! The remote side runs a single POSIX shell conditional that pipes the file
//! through `gzip -c` when gzip is installed and `cat`s it otherwise. Locally
//! the first two bytes are peeked: a gzip magic number switches on
//! decompression, anything else is passed through untouched. The caller's
//! `consume` callback only ever sees plain bytes.
//!
//! Data flow:
//!
//! ```text
//! channel.wait() --pump task--> duplex pipe --SyncIoBridge--> PeekReader
//!     --(GzDecoder)--> consume(&mut dyn Read)   [spawn_blocking]
//! ```

use std::io::Read;

use flate2::read::GzDecoder;
use russh::{Channel, ChannelMsg, client};
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio_util::io::SyncIoBridge;
use tracing::{debug, warn};

use crate::credentials::ServerInfo;
use crate::error::Error;
use crate::ssh::client::SessionFactory;
use crate::ssh::peek::PeekReader;
use crate::ssh::session::SshSession;
use crate::ssh::task::ScopedTask;

/// First two bytes of every gzip member (RFC 1952).
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Remote stderr kept for error reports.
const STDERR_CAPTURE_LIMIT: usize = 4096;

/// Buffer between the channel pump and the blocking consumer.
const PIPE_CAPACITY: usize = 64 * 1024;

/// Quote `value` as a single POSIX shell word.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// The shell command that streams `path`, gzip-compressed if possible.
///
/// The gzip branch reads through a redirection so a missing file makes the
/// shell fail instead of gzip happily compressing an empty stdin.
pub fn remote_read_command(path: &str) -> String {
    let quoted = shell_quote(path);
    format!(
        "if command -v gzip > /dev/null 2>&1; then\n  gzip -c < {quoted}\nelse\n  cat {quoted}\nfi"
    )
}

/// Hand `reader` to `consume`, transparently gunzipping it when it starts
/// with [`GZIP_MAGIC`]. Streams shorter than the magic are passed raw.
pub fn decode_stream<R, T, E, F>(reader: R, consume: F) -> std::result::Result<T, E>
where
    R: Read,
    E: From<Error>,
    F: FnOnce(&mut dyn Read) -> std::result::Result<T, E>,
{
    let mut reader = PeekReader::new(reader);
    let gzipped = reader
        .peek(GZIP_MAGIC.len())
        .map_err(Error::from)?
        .starts_with(&GZIP_MAGIC);

    if gzipped {
        debug!("Remote stream is gzip-compressed");
        let mut decoder = GzDecoder::new(reader);
        consume(&mut decoder)
    } else {
        debug!("Remote stream is uncompressed");
        consume(&mut reader)
    }
}

/// How the remote command ended, as seen by the pump.
#[derive(Debug, Default)]
struct RemoteExit {
    status: Option<u32>,
    stderr: String,
    /// The consumer returned before draining stdout and the channel was
    /// closed from our side.
    abandoned: bool,
}

/// Copy channel stdout into `sink` until the remote side finishes.
async fn pump_channel(mut channel: Channel<client::Msg>, sink: DuplexStream) -> RemoteExit {
    let mut sink = Some(sink);
    let mut exit = RemoteExit::default();
    let mut stderr = Vec::new();

    loop {
        match channel.wait().await {
            Some(ChannelMsg::Data { data }) => {
                let Some(writer) = sink.as_mut() else {
                    continue;
                };
                if let Err(e) = writer.write_all(&data).await {
                    debug!("Consumer stopped reading remote stream: {}", e);
                    exit.abandoned = true;
                    break;
                }
            }
            Some(ChannelMsg::ExtendedData { data, ext }) => {
                // ext == 1 is stderr in SSH protocol
                if ext == 1 {
                    let room = STDERR_CAPTURE_LIMIT.saturating_sub(stderr.len());
                    stderr.extend_from_slice(&data[..room.min(data.len())]);
                }
            }
            Some(ChannelMsg::ExitStatus { exit_status }) => {
                exit.status = Some(exit_status);
            }
            Some(ChannelMsg::Eof) => {
                // Let the consumer see end of stream now
                if let Some(mut writer) = sink.take() {
                    let _ = writer.shutdown().await;
                }
                if exit.status.is_some() {
                    break;
                }
            }
            Some(ChannelMsg::Close) | None => break,
            Some(_) => {}
        }
    }

    drop(sink);
    let _ = channel.close().await;

    exit.stderr = String::from_utf8_lossy(&stderr).into_owned();
    exit
}

/// Stream the remote file at `remote_path` into `consume`.
///
/// A fresh session is opened for the call and disconnected on every exit
/// path. `consume` runs on a blocking thread with a plain (already
/// decompressed) reader. Its error wins over the remote exit status; when it
/// succeeds, a non-zero or missing exit status is reported as
/// [`Error::RemoteCommand`].
pub async fn read_remote_file<T, E, F>(
    factory: &SessionFactory,
    server: &ServerInfo,
    remote_path: &str,
    consume: F,
) -> std::result::Result<T, E>
where
    T: Send + 'static,
    E: From<Error> + Send + 'static,
    F: FnOnce(&mut dyn Read) -> std::result::Result<T, E> + Send + 'static,
{
    let session = factory.connect(server).await?;
    debug!("Reading {} from {}", remote_path, session.address());

    let outcome = stream_remote_file(&session, remote_path, consume).await;
    session.disconnect().await;
    outcome
}

async fn stream_remote_file<T, E, F>(
    session: &SshSession,
    remote_path: &str,
    consume: F,
) -> std::result::Result<T, E>
where
    T: Send + 'static,
    E: From<Error> + Send + 'static,
    F: FnOnce(&mut dyn Read) -> std::result::Result<T, E> + Send + 'static,
{
    let channel = session.exec(&remote_read_command(remote_path)).await?;

    let (reader, writer) = tokio::io::duplex(PIPE_CAPACITY);
    let pump = ScopedTask::spawn(pump_channel(channel, writer));

    // The bridge captures the runtime handle, so build it here rather than
    // on the blocking thread.
    let bridge = SyncIoBridge::new(reader);
    let consumed = tokio::task::spawn_blocking(move || decode_stream(bridge, consume))
        .await
        .map_err(Error::from)?;

    // A failed consumer is reported as is; the pump is aborted when it goes
    // out of scope.
    let exit = match consumed {
        Ok(_) => pump.await.map_err(Error::from)?,
        Err(_) => RemoteExit::default(),
    };
    finish(remote_path, consumed, exit)
}

/// Combine the consumer's result with how the remote command ended.
///
/// A consumer error wins. Otherwise exit status 0 succeeds, as does a
/// missing status when the consumer stopped reading early.
fn finish<T, E>(
    remote_path: &str,
    consumed: std::result::Result<T, E>,
    exit: RemoteExit,
) -> std::result::Result<T, E>
where
    E: From<Error>,
{
    let value = consumed?;
    match exit.status {
        Some(0) => Ok(value),
        None if exit.abandoned => {
            debug!(
                "Remote read of {} abandoned after consumer finished",
                remote_path
            );
            Ok(value)
        }
        status => {
            warn!(
                "Remote read of {} failed with status {:?}: {}",
                remote_path,
                status,
                exit.stderr.trim()
            );
            Err(Error::RemoteCommand {
                status,
                stderr: exit.stderr,
            }
            .into())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;
    use crate::error::Result;

    fn read_all(reader: &mut dyn Read) -> Result<String> {
        let mut out = String::new();
        reader.read_to_string(&mut out)?;
        Ok(out)
    }

    mod command {
        use super::*;

        #[test]
        fn test_command_prefers_gzip() {
            let command = remote_read_command("/var/log/app.json");
            assert_eq!(
                command,
                "if command -v gzip > /dev/null 2>&1; then\n  gzip -c < '/var/log/app.json'\nelse\n  cat '/var/log/app.json'\nfi"
            );
        }

        #[test]
        fn test_command_quotes_single_quotes() {
            let command = remote_read_command("it's here.json");
            assert!(command.contains(r"gzip -c < 'it'\''s here.json'"));
            assert!(command.contains(r"cat 'it'\''s here.json'"));
        }

        #[test]
        fn test_command_does_not_expand_shell_syntax() {
            let command = remote_read_command("$(rm -rf ~)");
            assert!(command.contains("'$(rm -rf ~)'"));
        }
    }

    mod decoding {
        use super::*;

        #[test]
        fn test_gzip_stream_is_decompressed() {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(br#"[{"a":1}]"#).unwrap();
            let compressed = encoder.finish().unwrap();
            assert!(compressed.starts_with(&GZIP_MAGIC));

            let text = decode_stream(&compressed[..], read_all).unwrap();
            assert_eq!(text, r#"[{"a":1}]"#);
        }

        #[test]
        fn test_plain_stream_passes_through() {
            let text = decode_stream(&br#"{"plain":true}"#[..], read_all).unwrap();
            assert_eq!(text, r#"{"plain":true}"#);
        }

        #[test]
        fn test_empty_and_one_byte_streams() {
            assert_eq!(decode_stream(&b""[..], read_all).unwrap(), "");

            let one = decode_stream(&b"\x1f"[..], |r: &mut dyn Read| {
                let mut out = Vec::new();
                r.read_to_end(&mut out)?;
                Ok::<_, Error>(out)
            })
            .unwrap();
            assert_eq!(one, b"\x1f");
        }

        #[test]
        fn test_consumer_error_propagates() {
            let result: Result<()> = decode_stream(&b"data"[..], |_r: &mut dyn Read| {
                Err(Error::Channel("consumer gave up".to_string()))
            });
            assert!(matches!(result, Err(Error::Channel(_))));
        }

        #[test]
        fn test_corrupt_gzip_surfaces_io_error() {
            let result = decode_stream(&b"\x1f\x8bnot really gzip"[..], read_all);
            assert!(matches!(result, Err(Error::Io(_))));
        }

        #[tokio::test]
        async fn test_bridge_from_async_pipe() {
            let (reader, mut writer) = tokio::io::duplex(16);
            let feeder = tokio::spawn(async move {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(b"streamed through a pipe").unwrap();
                let compressed = encoder.finish().unwrap();
                writer.write_all(&compressed).await.unwrap();
                writer.shutdown().await.unwrap();
            });

            let bridge = SyncIoBridge::new(reader);
            let text = tokio::task::spawn_blocking(move || decode_stream(bridge, read_all))
                .await
                .unwrap()
                .unwrap();
            feeder.await.unwrap();
            assert_eq!(text, "streamed through a pipe");
        }
    }

    mod exit_status {
        use super::*;

        fn exited(status: Option<u32>, stderr: &str, abandoned: bool) -> RemoteExit {
            RemoteExit {
                status,
                stderr: stderr.to_string(),
                abandoned,
            }
        }

        #[test]
        fn test_zero_status_returns_value() {
            let result: Result<u32> = finish("/data.json", Ok(7), exited(Some(0), "", false));
            assert_eq!(result.unwrap(), 7);
        }

        #[test]
        fn test_nonzero_status_carries_stderr() {
            let exit = exited(Some(1), "cat: /data.json: No such file or directory\n", false);
            let result: Result<u32> = finish("/data.json", Ok(7), exit);
            match result {
                Err(Error::RemoteCommand { status, stderr }) => {
                    assert_eq!(status, Some(1));
                    assert!(stderr.contains("No such file or directory"));
                }
                other => panic!("expected remote command error, got {:?}", other),
            }
        }

        #[test]
        fn test_missing_status_after_early_stop_succeeds() {
            let result: Result<u32> = finish("/data.json", Ok(7), exited(None, "", true));
            assert_eq!(result.unwrap(), 7);
        }

        #[test]
        fn test_missing_status_without_early_stop_fails() {
            let result: Result<u32> = finish("/data.json", Ok(7), exited(None, "", false));
            assert!(matches!(
                result,
                Err(Error::RemoteCommand { status: None, .. })
            ));
        }

        #[test]
        fn test_consumer_error_wins_over_exit_status() {
            let consumed: Result<u32> = Err(Error::Channel("consumer gave up".to_string()));
            let result = finish("/data.json", consumed, exited(Some(1), "boom", false));
            assert!(matches!(result, Err(Error::Channel(_))));
        }
    }
}
