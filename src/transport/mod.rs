//! Transport module - TCP connection and framed reading.
//!
//! Provides:
//! - [`connect`]: resolve and connect to the transmitter's control port
//! - [`FramedReader`]: one newline-terminated message per call, with
//!   timeout, close, and cancellation reported distinctly

mod reader;
mod tcp;

pub use reader::{FramedReader, ReadOutcome, DEFAULT_POLL_INTERVAL};
pub use tcp::connect;
