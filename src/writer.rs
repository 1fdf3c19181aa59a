//! Dedicated writer task for outgoing lines.
//!
//! The session's foreground path never writes to the socket directly once a
//! session is active; it hands encoded lines to the writer task through an
//! mpsc channel. The task owns the write half, batches whatever is queued
//! into one write, and turns any write failure into a reconnect request.
//!
//! # Architecture
//!
//! ```text
//! Foreground ─► mpsc::Sender<Bytes> ─► Writer Task ─► socket write half
//! ```
//!
//! Dropping every [`WriterHandle`] ends the task, which then shuts down the
//! write half.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::control::ControlFlags;
use crate::error::{LrsnError, Result};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Default timeout for a single write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum lines to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 32;

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Channel capacity for the line queue.
    pub channel_capacity: usize,
    /// Timeout for a single write; expiry counts as a send failure.
    pub write_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// Handle for queueing lines to the writer task.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<Bytes>,
}

impl WriterHandle {
    /// Queue an encoded, newline-terminated line.
    ///
    /// # Errors
    ///
    /// Returns [`LrsnError::ConnectionClosed`] if the writer task has
    /// stopped.
    pub async fn send(&self, line: Bytes) -> Result<()> {
        self.tx
            .send(line)
            .await
            .map_err(|_| LrsnError::ConnectionClosed)
    }

    /// Whether the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for queueing lines.
///
/// # Returns
///
/// A tuple of `(WriterHandle, JoinHandle)` where the JoinHandle can be used
/// to wait for the writer task to complete.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
    control: ControlFlags,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let task = tokio::spawn(writer_loop(rx, writer, config.write_timeout, control));
    (WriterHandle { tx }, task)
}

/// Main writer loop - receives lines and writes them to the socket.
async fn writer_loop<W>(
    mut rx: mpsc::Receiver<Bytes>,
    mut writer: W,
    write_timeout: Duration,
    control: ControlFlags,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(first) = rx.recv().await {
        // Collect additional ready lines (non-blocking)
        let mut batch = BytesMut::from(&first[..]);
        let mut count = 1;
        while count < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(line) => {
                    batch.extend_from_slice(&line);
                    count += 1;
                }
                Err(_) => break,
            }
        }

        if let Err(e) = write_with_timeout(&mut writer, &batch, write_timeout).await {
            tracing::error!("Unable to send {} line(s): {}. Attempting to reconnect.", count, e);
            control.request_reconnect();
            rx.close();
            return Err(LrsnError::Send(e));
        }
        tracing::trace!("Wrote {} line(s), {} bytes", count, batch.len());
    }

    // Channel closed, clean shutdown
    let _ = writer.shutdown().await;
    Ok(())
}

/// Write and flush one buffer, bounded by `timeout`.
pub(crate) async fn write_with_timeout<W>(
    writer: &mut W,
    data: &[u8],
    timeout: Duration,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let write = async {
        writer.write_all(data).await?;
        writer.flush().await
    };

    match tokio::time::timeout(timeout, write).await {
        Ok(result) => result,
        Err(_) => Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("write timed out after {:?}", timeout),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::{duplex, AsyncReadExt};

    #[test]
    fn test_writer_config_default() {
        let config = WriterConfig::default();
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.write_timeout, DEFAULT_WRITE_TIMEOUT);
    }

    #[tokio::test]
    async fn test_writer_handle_send() {
        let (client, mut server) = duplex(4096);
        let (handle, _task) =
            spawn_writer_task(client, WriterConfig::default(), ControlFlags::new());

        handle
            .send(Bytes::from_static(b"<Login services=\"NetPage;Heartbeat\" />\n"))
            .await
            .unwrap();

        let mut buf = vec![0u8; 128];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"<Login services=\"NetPage;Heartbeat\" />\n");
    }

    #[tokio::test]
    async fn test_lines_arrive_in_order() {
        let (client, mut server) = duplex(4096);
        let (handle, task) =
            spawn_writer_task(client, WriterConfig::default(), ControlFlags::new());

        for i in 1..=10 {
            handle
                .send(Bytes::from(format!("<L n=\"{}\" />\n", i)))
                .await
                .unwrap();
        }
        drop(handle);
        task.await.unwrap().unwrap();

        let mut received = String::new();
        server.read_to_string(&mut received).await.unwrap();

        let expected: String = (1..=10).map(|i| format!("<L n=\"{}\" />\n", i)).collect();
        assert_eq!(received, expected);
    }

    #[tokio::test]
    async fn test_writer_shutdown_on_channel_close() {
        let (client, mut server) = duplex(4096);
        let (handle, task) =
            spawn_writer_task(client, WriterConfig::default(), ControlFlags::new());

        drop(handle);

        let result = task.await.unwrap();
        assert!(result.is_ok());

        // Write half was shut down: peer sees EOF
        let mut buf = [0u8; 8];
        assert_eq!(server.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_write_failure_requests_reconnect() {
        let (client, server) = duplex(64);
        drop(server);

        let control = ControlFlags::new();
        let (handle, task) = spawn_writer_task(client, WriterConfig::default(), control.clone());

        handle
            .send(Bytes::from_static(b"<PageRequest id=\"1\" />\n"))
            .await
            .unwrap();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(LrsnError::Send(_))));
        assert!(control.is_reconnect());
        assert!(handle.is_closed());
        assert!(matches!(
            handle.send(Bytes::from_static(b"x\n")).await,
            Err(LrsnError::ConnectionClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_write_times_out() {
        // Peer never reads, so the 16-byte pipe fills and the write stalls
        let (client, _server) = duplex(16);
        let control = ControlFlags::new();
        let config = WriterConfig {
            channel_capacity: 4,
            write_timeout: Duration::from_secs(2),
        };
        let (handle, task) = spawn_writer_task(client, config, control.clone());

        handle.send(Bytes::from(vec![b'x'; 64])).await.unwrap();

        let result = task.await.unwrap();
        match result {
            Err(LrsnError::Send(e)) => assert_eq!(e.kind(), std::io::ErrorKind::TimedOut),
            other => panic!("expected send timeout, got {:?}", other),
        }
        assert!(control.is_reconnect());
    }

    #[tokio::test]
    async fn test_write_with_timeout_cursor() {
        let mut buf = Cursor::new(Vec::new());

        write_with_timeout(&mut buf, b"<A />\n", Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(buf.into_inner(), b"<A />\n");
    }
}
