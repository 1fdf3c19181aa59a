//! Listener task: framed reads, decoding, watchdog and dispatch.
//!
//! One listener runs per active session. It owns the read half of the socket
//! and the [`HeartbeatWatchdog`], so heartbeat observations are applied in
//! arrival order with no shared mutable state. Every non-heartbeat message is
//! logged and forwarded to the session over a channel.
//!
//! The listener exits when:
//! - quit or reconnect is requested ([`ListenerExit::Stopped`])
//! - the transmitter closes the connection
//! - the watchdog expires
//! - a malformed message or read error occurs
//!
//! In every case except `Stopped` it requests a reconnect itself before
//! returning.

use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::codec::XmlCodec;
use crate::control::ControlFlags;
use crate::error::LrsnError;
use crate::protocol::{attrs, Message, MessageKind};
use crate::transport::{FramedReader, ReadOutcome};
use crate::watchdog::{HeartbeatWatchdog, Liveness};

/// Default upper bound on a single framed read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Why the listener stopped.
#[derive(Debug)]
pub enum ListenerExit {
    /// Quit or reconnect was requested elsewhere.
    Stopped,
    /// The transmitter closed the connection.
    Closed,
    /// No heartbeat within the declared interval.
    Expired {
        /// Interval declared by the last heartbeat.
        interval: Duration,
        /// Silence observed when the check fired.
        silence: Duration,
    },
    /// Malformed message or read failure.
    Failed(LrsnError),
}

impl ListenerExit {
    /// Convert to the error that ended the session, if any.
    pub fn into_error(self) -> Option<LrsnError> {
        match self {
            ListenerExit::Stopped => None,
            ListenerExit::Closed => Some(LrsnError::ConnectionClosed),
            ListenerExit::Expired { interval, .. } => Some(LrsnError::WatchdogExpired { interval }),
            ListenerExit::Failed(e) => Some(e),
        }
    }
}

/// Receive loop for one session.
pub struct Listener<R> {
    reader: FramedReader<R>,
    watchdog: HeartbeatWatchdog,
    control: ControlFlags,
    messages: mpsc::Sender<Message>,
    read_timeout: Duration,
}

impl<R> Listener<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    /// Create a listener.
    ///
    /// The reader should already observe `control` (see
    /// [`FramedReader::with_control`]) so stop requests cut reads short.
    pub fn new(
        reader: FramedReader<R>,
        control: ControlFlags,
        messages: mpsc::Sender<Message>,
        read_timeout: Duration,
    ) -> Self {
        Self {
            reader,
            watchdog: HeartbeatWatchdog::new(),
            control,
            messages,
            read_timeout,
        }
    }

    /// Run the listener on its own task.
    pub fn spawn(self) -> JoinHandle<ListenerExit> {
        tokio::spawn(self.run())
    }

    /// Run until stopped or the link fails.
    pub async fn run(mut self) -> ListenerExit {
        let exit = self.run_inner().await;

        if !matches!(exit, ListenerExit::Stopped) {
            self.control.request_reconnect();
        }
        tracing::debug!("Listener exited: {:?}", exit);
        exit
    }

    async fn run_inner(&mut self) -> ListenerExit {
        loop {
            if self.control.should_stop() {
                return ListenerExit::Stopped;
            }

            // Never wait past the watchdog deadline
            let wait = self
                .watchdog
                .remaining(Instant::now())
                .map_or(self.read_timeout, |left| left.min(self.read_timeout));

            match self.reader.read_message(wait).await {
                Ok(ReadOutcome::Line(line)) => {
                    let message = match XmlCodec::decode(&line) {
                        Ok(message) => message,
                        Err(e) => {
                            tracing::error!("{}. Closing.", e);
                            return ListenerExit::Failed(e);
                        }
                    };
                    if let Err(e) = self.dispatch(message) {
                        tracing::error!("{}. Closing.", e);
                        return ListenerExit::Failed(e);
                    }
                }
                Ok(ReadOutcome::Timeout) => {}
                Ok(ReadOutcome::Closed) => {
                    tracing::warn!("Connection closed by transmitter");
                    return ListenerExit::Closed;
                }
                Ok(ReadOutcome::Cancelled) => return ListenerExit::Stopped,
                Err(e) => {
                    tracing::error!("Error reading from socket: {}", e);
                    return ListenerExit::Failed(e);
                }
            }

            if let Liveness::Expired { interval, silence } = self.watchdog.check(Instant::now()) {
                tracing::warn!(
                    "Did not receive LRSN Heartbeat within {:?} (silent for {:?}). Closing.",
                    interval,
                    silence
                );
                return ListenerExit::Expired { interval, silence };
            }
        }
    }

    /// Route one decoded message.
    fn dispatch(&mut self, message: Message) -> crate::error::Result<()> {
        if self.watchdog.observe(&message, Instant::now())? {
            tracing::debug!(
                "Heartbeat, interval {}s",
                message.attr(attrs::INTERVAL).unwrap_or("?")
            );
            return Ok(());
        }

        match message.kind() {
            MessageKind::PageRequestStatus => {
                tracing::info!(
                    id = message.attr(attrs::ID).unwrap_or("?"),
                    "Got: {}",
                    message
                );
            }
            MessageKind::Other => tracing::debug!("Got unrecognized message: {}", message),
            _ => tracing::info!("Got: {}", message),
        }

        match self.messages.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(message)) => {
                tracing::warn!("Message queue full, dropping <{}>", message.tag());
            }
            // Nobody is listening; logging above is enough
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
        Ok(())
    }
}
