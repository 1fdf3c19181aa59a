//! Framed reader over a byte stream.
//!
//! [`FramedReader`] yields one complete line per call. Reads are attempted in
//! slices of the poll interval so that a quit or reconnect request is noticed
//! within one interval even while no data is arriving.
//!
//! # Example
//!
//! ```ignore
//! use lrsn_client::transport::{FramedReader, ReadOutcome};
//!
//! let mut reader = FramedReader::new(read_half).with_control(flags.clone());
//! match reader.read_message(Duration::from_secs(5)).await? {
//!     ReadOutcome::Line(line) => println!("got {:?}", line),
//!     ReadOutcome::Timeout => println!("nothing yet"),
//!     ReadOutcome::Closed => println!("peer hung up"),
//!     ReadOutcome::Cancelled => println!("stop requested"),
//! }
//! ```

use std::io::ErrorKind;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;

use crate::control::ControlFlags;
use crate::error::Result;
use crate::protocol::LineBuffer;

/// Default interval between read attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Size of a single socket read.
const READ_CHUNK_SIZE: usize = 1024;

/// Result of a single [`FramedReader::read_message`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A complete line, terminator removed.
    Line(Bytes),
    /// No terminator arrived within the wait.
    Timeout,
    /// The peer closed the connection (zero-length read).
    Closed,
    /// A quit or reconnect request was observed mid-read.
    Cancelled,
}

/// Reads newline-terminated messages from a stream.
pub struct FramedReader<R> {
    reader: R,
    buffer: LineBuffer,
    chunk: Box<[u8]>,
    poll_interval: Duration,
    control: Option<ControlFlags>,
    closed: bool,
}

impl<R: AsyncRead + Unpin> FramedReader<R> {
    /// Create a reader with the default poll interval and line limit.
    pub fn new(reader: R) -> Self {
        Self::with_buffer(reader, LineBuffer::new())
    }

    /// Create a reader around a preconfigured line buffer.
    pub fn with_buffer(reader: R, buffer: LineBuffer) -> Self {
        Self {
            reader,
            buffer,
            chunk: vec![0u8; READ_CHUNK_SIZE].into_boxed_slice(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            control: None,
            closed: false,
        }
    }

    /// Set the poll interval (builder style).
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    /// Observe control flags; reads return [`ReadOutcome::Cancelled`] once
    /// either flag is set.
    pub fn with_control(mut self, control: ControlFlags) -> Self {
        self.control = Some(control);
        self
    }

    /// Read the next complete message, waiting at most `max_wait`.
    ///
    /// Lines already buffered are returned without touching the stream.
    /// Transient `WouldBlock`/`Interrupted` errors are retried within the
    /// wait window.
    ///
    /// # Errors
    ///
    /// Returns an I/O error for any other read failure, or a protocol error
    /// if a line exceeds the configured maximum length.
    pub async fn read_message(&mut self, max_wait: Duration) -> Result<ReadOutcome> {
        let start = Instant::now();

        loop {
            if let Some(line) = self.buffer.next_line()? {
                return Ok(ReadOutcome::Line(line));
            }

            if self.closed {
                return Ok(ReadOutcome::Closed);
            }

            if self.is_cancelled() {
                return Ok(ReadOutcome::Cancelled);
            }

            let elapsed = start.elapsed();
            if elapsed >= max_wait {
                return Ok(ReadOutcome::Timeout);
            }

            let slice = self.poll_interval.min(max_wait - elapsed);
            match tokio::time::timeout(slice, self.reader.read(&mut self.chunk)).await {
                // Poll slice elapsed with no data
                Err(_) => continue,
                Ok(Ok(0)) => {
                    self.closed = true;
                }
                Ok(Ok(n)) => {
                    self.buffer.extend(&self.chunk[..n]);
                }
                Ok(Err(e)) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                    tokio::time::sleep(slice).await;
                }
                Ok(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Number of bytes buffered but not yet returned.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Get a reference to the underlying reader.
    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Consume the framed reader, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    fn is_cancelled(&self) -> bool {
        self.control
            .as_ref()
            .map(ControlFlags::should_stop)
            .unwrap_or(false)
    }
}
