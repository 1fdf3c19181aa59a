//! Line buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` so completed lines are split off without copying.
//! Bytes that arrive after a terminator stay buffered for the next line, so a
//! transmitter that writes two messages in one segment loses nothing.
//!
//! # Example
//!
//! ```
//! use lrsn_client::protocol::LineBuffer;
//!
//! let mut buffer = LineBuffer::new();
//!
//! buffer.extend(b"<Heartbeat inter");
//! assert!(buffer.next_line().unwrap().is_none());
//!
//! buffer.extend(b"val=\"10\" />\n");
//! let line = buffer.next_line().unwrap().unwrap();
//! assert_eq!(&line[..], b"<Heartbeat interval=\"10\" />");
//! ```

use bytes::{Bytes, BytesMut};

use super::wire_format::{DEFAULT_MAX_LINE_LENGTH, LINE_TERMINATOR};
use crate::error::{LrsnError, Result};

/// Buffer for accumulating incoming bytes and extracting complete lines.
pub struct LineBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Prefix of `buffer` already known to contain no terminator.
    scanned: usize,
    /// Maximum allowed line length, terminator excluded.
    max_line_length: usize,
}

impl LineBuffer {
    /// Create a new line buffer with the default maximum line length.
    pub fn new() -> Self {
        Self::with_max_line_length(DEFAULT_MAX_LINE_LENGTH)
    }

    /// Create a new line buffer with a custom maximum line length.
    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(1024),
            scanned: 0,
            max_line_length,
        }
    }

    /// Append raw bytes from a socket read.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Extract the next complete line, without its terminator.
    ///
    /// Returns:
    /// - `Ok(Some(line))` if a terminator was found
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` if the pending line exceeds the maximum length
    ///
    /// A `\r` directly before the terminator is dropped as well.
    pub fn next_line(&mut self) -> Result<Option<Bytes>> {
        let found = self.buffer[self.scanned..]
            .iter()
            .position(|&b| b == LINE_TERMINATOR);

        let Some(offset) = found else {
            self.scanned = self.buffer.len();
            if self.buffer.len() > self.max_line_length {
                return Err(LrsnError::Protocol(format!(
                    "Line length {} exceeds maximum {}",
                    self.buffer.len(),
                    self.max_line_length
                )));
            }
            return Ok(None);
        };

        let end = self.scanned + offset;
        self.scanned = 0;

        let mut line = self.buffer.split_to(end + 1);
        line.truncate(end);
        if line.last() == Some(&b'\r') {
            line.truncate(end - 1);
        }

        if line.len() > self.max_line_length {
            return Err(LrsnError::Protocol(format!(
                "Line length {} exceeds maximum {}",
                line.len(),
                self.max_line_length
            )));
        }

        Ok(Some(line.freeze()))
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Discard all buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}
