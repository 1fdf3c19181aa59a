//! Error types for lrsn-client.

use std::time::Duration;

use thiserror::Error;

/// Main error type for all LRSN operations.
///
/// Every variant except [`LrsnError::Socket`] is recovered at the session
/// boundary by requesting a reconnect (or, for [`LrsnError::UserQuit`], a
/// shutdown). Callers of the supervisor only ever see `Socket`.
#[derive(Debug, Error)]
pub enum LrsnError {
    /// I/O error while reading from the transmitter.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The local socket could not be created at all.
    #[error("Unable to create socket: {0}")]
    Socket(#[source] std::io::Error),

    /// The transmitter could not be reached.
    #[error("Unable to connect to {addr} - {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Login was rejected or the acknowledgment was malformed.
    #[error("Login failed: {0}")]
    Login(String),

    /// Malformed message on the wire.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Write failure mid-session.
    #[error("Send failed: {0}")]
    Send(#[source] std::io::Error),

    /// No heartbeat arrived within the declared interval.
    #[error("No heartbeat within {interval:?}")]
    WatchdogExpired { interval: Duration },

    /// A background task panicked or was cancelled.
    #[error("Task failed: {0}")]
    TaskFailed(String),

    /// Connection closed by the peer or the session tore down.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Operator requested shutdown.
    #[error("Quit requested")]
    UserQuit,
}

/// Result type alias using LrsnError.
pub type Result<T> = std::result::Result<T, LrsnError>;
