//! Client builder and runtime handle.
//!
//! The [`ClientBuilder`] provides a fluent API for configuring the
//! connection. [`ClientBuilder::start`] spawns the reconnect supervisor and
//! returns a [`Client`], which manages the lifecycle:
//! 1. Connect and log in to the transmitter
//! 2. Watch heartbeats and forward page requests while active
//! 3. Reconnect after a delay whenever the link degrades
//! 4. Stop when quit is requested
//!
//! # Example
//!
//! ```ignore
//! use lrsn_client::{ClientBuilder, PageIntent, PagerType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ClientBuilder::new("192.168.1.50")
//!         .system_id(2)
//!         .start();
//!
//!     client
//!         .pages()
//!         .send_page(PageIntent::new(PagerType::Alpha, 1234, "Table ready"))
//!         .await?;
//!
//!     client.quit();
//!     client.wait_for_shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::control::ControlFlags;
use crate::error::{LrsnError, Result};
use crate::listener::DEFAULT_READ_TIMEOUT;
use crate::protocol::{Message, PageIntent, DEFAULT_MAX_LINE_LENGTH, DEFAULT_SERVICES, LRSN_PORT};
use crate::session::LinkEvent;
use crate::supervisor::{Supervisor, SupervisorSummary};
use crate::transport::DEFAULT_POLL_INTERVAL;
use crate::writer::WriterConfig;

/// Default timeout for establishing the TCP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on joining the listener during teardown.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Default delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Default ceiling for the reconnect delay when backoff is enabled.
pub const DEFAULT_MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Default capacity of the page intent queue.
pub const DEFAULT_INTENT_CAPACITY: usize = 32;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Resolved client configuration, shared by every session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Transmitter host name or address.
    pub host: String,
    /// Transmitter TCP port.
    pub port: u16,
    /// Sent as `system_id` on every page request when set.
    pub system_id: Option<u32>,
    /// `services` attribute of the login request.
    pub services: String,
    pub connect_timeout: Duration,
    /// Wait for greeting and login acknowledgment, and the read slice of the
    /// active listener.
    pub read_timeout: Duration,
    /// Granularity at which reads observe quit/reconnect.
    pub poll_interval: Duration,
    /// Bound on joining the listener and writer during teardown.
    pub join_timeout: Duration,
    pub reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
    /// 1 keeps the delay fixed.
    pub backoff_multiplier: u32,
    pub writer: WriterConfig,
    pub max_line_length: usize,
    pub intent_capacity: usize,
}

impl ClientConfig {
    /// Defaults for the given host.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: LRSN_PORT,
            system_id: None,
            services: DEFAULT_SERVICES.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_delay: DEFAULT_MAX_RECONNECT_DELAY,
            backoff_multiplier: 1,
            writer: WriterConfig::default(),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            intent_capacity: DEFAULT_INTENT_CAPACITY,
        }
    }
}

/// Builder for configuring and starting an LRSN client.
pub struct ClientBuilder {
    config: ClientConfig,
    control: Option<ControlFlags>,
}

impl ClientBuilder {
    /// Create a builder for the transmitter at `host`.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            config: ClientConfig::new(host),
            control: None,
        }
    }

    /// Set the transmitter port.
    ///
    /// Default: 3700
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Attach a system id to every page request.
    pub fn system_id(mut self, id: u32) -> Self {
        self.config.system_id = Some(id);
        self
    }

    /// Set the services requested at login.
    ///
    /// Default: `NetPage;Heartbeat`
    pub fn services(mut self, services: impl Into<String>) -> Self {
        self.config.services = services.into();
        self
    }

    /// Set the TCP connect timeout.
    ///
    /// Default: 10 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the read timeout.
    ///
    /// Default: 5 seconds
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Set the cancellation poll interval.
    ///
    /// Default: 100 ms
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the bound on joining background tasks at teardown.
    ///
    /// Default: 2 seconds
    pub fn join_timeout(mut self, timeout: Duration) -> Self {
        self.config.join_timeout = timeout;
        self
    }

    /// Set the delay between reconnect attempts.
    ///
    /// Default: 5 seconds
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    /// Set the ceiling for the reconnect delay.
    ///
    /// Default: 60 seconds
    pub fn max_reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.max_reconnect_delay = delay;
        self
    }

    /// Multiply the reconnect delay after each failed attempt.
    ///
    /// Default: 1 (fixed delay)
    pub fn backoff_multiplier(mut self, multiplier: u32) -> Self {
        self.config.backoff_multiplier = multiplier;
        self
    }

    /// Set the timeout for a single socket write.
    ///
    /// Default: 5 seconds
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.writer.write_timeout = timeout;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 64
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.writer.channel_capacity = capacity;
        self
    }

    /// Set the maximum accepted line length.
    ///
    /// Default: 64 KiB
    pub fn max_line_length(mut self, len: usize) -> Self {
        self.config.max_line_length = len;
        self
    }

    /// Set how many page intents may wait for an active session.
    ///
    /// Default: 32
    pub fn intent_capacity(mut self, capacity: usize) -> Self {
        self.config.intent_capacity = capacity;
        self
    }

    /// Share existing control flags, e.g. ones already wired to Ctrl-C.
    pub fn control(mut self, control: ControlFlags) -> Self {
        self.control = Some(control);
        self
    }

    /// The configuration built so far.
    pub fn config(&self) -> ClientConfig {
        self.config.clone()
    }

    /// Spawn the reconnect supervisor.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> Client {
        Client::start(self.config, self.control.unwrap_or_default())
    }
}

/// Submits page intents to the running client.
#[derive(Clone)]
pub struct PageSender {
    tx: mpsc::Sender<PageIntent>,
}

impl PageSender {
    pub(crate) fn new(tx: mpsc::Sender<PageIntent>) -> Self {
        Self { tx }
    }

    /// Queue a page. It is sent once a session is active, with that
    /// session's next sequence id.
    ///
    /// # Errors
    ///
    /// Returns [`LrsnError::ConnectionClosed`] once the client has stopped.
    pub async fn send_page(&self, intent: PageIntent) -> Result<()> {
        self.tx
            .send(intent)
            .await
            .map_err(|_| LrsnError::ConnectionClosed)
    }

    /// Whether the client has stopped accepting pages.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A running LRSN client.
///
/// Use `pages()` to submit page requests and `subscribe()` to watch
/// transmitter messages. Use `wait_for_shutdown()` to block until quit.
pub struct Client {
    control: ControlFlags,
    pages: PageSender,
    events: broadcast::Sender<Message>,
    status: broadcast::Sender<LinkEvent>,
    task: JoinHandle<Result<SupervisorSummary>>,
}

impl Client {
    /// Create a new client builder.
    pub fn builder(host: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(host)
    }

    fn start(config: ClientConfig, control: ControlFlags) -> Self {
        let (intent_tx, intent_rx) = mpsc::channel(config.intent_capacity.max(1));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (status, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let supervisor = Supervisor::new(Arc::new(config), control.clone(), events.clone())
            .with_status(status.clone());
        let task = tokio::spawn(supervisor.run(intent_rx));

        Client {
            control,
            pages: PageSender::new(intent_tx),
            events,
            status,
            task,
        }
    }

    /// Handle for submitting pages.
    pub fn pages(&self) -> PageSender {
        self.pages.clone()
    }

    /// Non-heartbeat messages received while a session is active, such as
    /// `PageRequestStatus`.
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.events.subscribe()
    }

    /// Connect, login and reconnect notifications.
    pub fn status(&self) -> broadcast::Receiver<LinkEvent> {
        self.status.subscribe()
    }

    /// The shared quit/reconnect flags.
    pub fn control(&self) -> ControlFlags {
        self.control.clone()
    }

    /// Request shutdown.
    pub fn quit(&self) {
        self.control.request_quit();
    }

    /// Wait until the supervisor stops.
    ///
    /// This consumes the client. Once every [`PageSender`] is dropped the
    /// client quits on its own.
    ///
    /// # Errors
    ///
    /// [`LrsnError::Socket`] if no socket could be created.
    pub async fn wait_for_shutdown(self) -> Result<SupervisorSummary> {
        drop(self.pages);
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(LrsnError::TaskFailed(format!("supervisor: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = ClientBuilder::new("10.0.0.5").config();

        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.port, 3700);
        assert_eq!(config.system_id, None);
        assert_eq!(config.services, "NetPage;Heartbeat");
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.read_timeout, Duration::from_secs(5));
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.backoff_multiplier, 1);
        assert_eq!(config.intent_capacity, 32);
    }

    #[test]
    fn test_builder_configuration() {
        let config = Client::builder("transmitter.local")
            .port(13700)
            .system_id(7)
            .services("NetPage")
            .read_timeout(Duration::from_secs(1))
            .poll_interval(Duration::from_millis(20))
            .join_timeout(Duration::from_millis(500))
            .reconnect_delay(Duration::from_secs(2))
            .backoff_multiplier(2)
            .max_reconnect_delay(Duration::from_secs(30))
            .write_timeout(Duration::from_secs(3))
            .channel_capacity(8)
            .max_line_length(1024)
            .intent_capacity(4)
            .config();

        assert_eq!(config.port, 13700);
        assert_eq!(config.system_id, Some(7));
        assert_eq!(config.services, "NetPage");
        assert_eq!(config.read_timeout, Duration::from_secs(1));
        assert_eq!(config.poll_interval, Duration::from_millis(20));
        assert_eq!(config.join_timeout, Duration::from_millis(500));
        assert_eq!(config.reconnect_delay, Duration::from_secs(2));
        assert_eq!(config.backoff_multiplier, 2);
        assert_eq!(config.max_reconnect_delay, Duration::from_secs(30));
        assert_eq!(config.writer.write_timeout, Duration::from_secs(3));
        assert_eq!(config.writer.channel_capacity, 8);
        assert_eq!(config.max_line_length, 1024);
        assert_eq!(config.intent_capacity, 4);
    }

    #[tokio::test]
    async fn test_quit_stops_client() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = ClientBuilder::new("127.0.0.1")
            .port(port)
            .reconnect_delay(Duration::from_secs(30))
            .start();
        let pages = client.pages();

        client.quit();
        let summary = tokio::time::timeout(Duration::from_secs(2), client.wait_for_shutdown())
            .await
            .unwrap()
            .unwrap();

        assert!(summary.attempts <= 1);
        assert!(pages.is_closed());
    }

    #[tokio::test]
    async fn test_shared_control_flags() {
        let control = ControlFlags::new();
        control.request_quit();

        let client = ClientBuilder::new("127.0.0.1").control(control).start();
        assert!(client.control().is_quit());

        let summary = client.wait_for_shutdown().await.unwrap();
        assert_eq!(summary.attempts, 0);
    }
}
